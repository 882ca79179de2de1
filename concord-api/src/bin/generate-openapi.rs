//! OpenAPI Specification Generator Binary
//!
//! Writes the Concord OpenAPI specification as JSON to stdout.
//!
//! Usage:
//!   cargo run -p concord-api --bin generate-openapi > openapi.json

use concord_api::ApiDoc;

fn main() {
    match ApiDoc::to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize OpenAPI document: {}", e);
            std::process::exit(1);
        }
    }
}
