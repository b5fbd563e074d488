use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::Error;

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        // Display only names the upstream url and an error class. Sources stay in the logs.
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::plaintext())
            .body(self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::NoCachedData { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
