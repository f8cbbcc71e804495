//! The `/validate` endpoint: checks a request body against the published
//! request schema and reports the findings as plain text.

use crate::api::utils::plain_response;
use crate::context::ServerContext;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use std::fmt::Write;

pub fn handle(ctx: &ServerContext, body: Bytes) -> Response<Full<Bytes>> {
    let Some(schema) = &ctx.request_schema else {
        return plain_response(StatusCode::OK, "Validation schema not loaded\n");
    };

    let instance: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(instance) => instance,
        Err(err) => {
            return plain_response(StatusCode::OK, format!("Error parsing json: {err}\n"));
        }
    };

    let mut report = String::new();
    for error in schema.iter_errors(&instance) {
        let _ = writeln!(report, "Error: {} {}", error.instance_path, error);
    }

    if report.is_empty() {
        plain_response(StatusCode::OK, "Validation successful\n")
    } else {
        plain_response(StatusCode::OK, report)
    }
}
