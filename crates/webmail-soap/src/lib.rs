//! # webmail-soap
//!
//! SOAP-over-JSON transport for the webmail mail service.
//!
//! The mail server speaks a SOAP dialect where every request is a JSON
//! envelope posted to `/service/soap/<Method>Request`. Successful calls return
//! `Body.<Method>Response`; failures return a structured `Body.Fault`.
//!
//! ## Features
//!
//! - **Envelope handling**: auth context header, namespace tagging, fault parsing
//! - **Typed wire structs**: `SaveDraft`, `SendMsg`, `MsgAction`, `Search`
//! - **Uploads**: multipart upload endpoint with attachment id parsing
//!
//! ## Example
//!
//! ```ignore
//! use webmail_soap::{ServerConfig, SoapClient, wire};
//!
//! let client = SoapClient::new(ServerConfig::new("https://mail.example.com"))?;
//! let response: wire::SaveDraftResponse = client
//!     .request("SaveDraft", wire::MAIL_NAMESPACE, &wire::SaveDraftRequest { m: message })
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod fault;
mod upload;
pub mod wire;

pub use client::{ServerConfig, SoapClient, envelope, parse_response};
pub use error::{Error, Result};
pub use fault::Fault;
pub use upload::{UploadedFile, parse_upload_reply};
