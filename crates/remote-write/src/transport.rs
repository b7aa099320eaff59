// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of a compressed write request to the remote endpoint.
//!
//! One POST per payload, no retries. Only `200 OK` counts as delivered.

use async_trait::async_trait;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::constants;
use crate::errors::ShippingError;

/// Compressed request body together with its codec name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    pub body: Vec<u8>,
    pub content_encoding: &'static str,
}

#[async_trait]
pub trait Transport {
    async fn send(&self, payload: Payload) -> Result<(), ShippingError>;
}

#[derive(Clone, Debug)]
pub struct RemoteWriteClient {
    client: Client,
    endpoint: String,
}

impl RemoteWriteClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ShippingError> {
        let client = Client::builder().build().map_err(|e| {
            ShippingError::Destination(None, format!("Failed to build HTTP client: {e}"))
        })?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for RemoteWriteClient {
    async fn send(&self, payload: Payload) -> Result<(), ShippingError> {
        debug!(
            "Sending {} bytes ({}) to {}",
            payload.body.len(),
            payload.content_encoding,
            self.endpoint
        );
        let resp = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, constants::CONTENT_TYPE)
            .header(CONTENT_ENCODING, payload.content_encoding)
            .header(
                constants::REMOTE_WRITE_VERSION_HEADER,
                constants::REMOTE_WRITE_VERSION,
            )
            .body(payload.body)
            .send()
            .await
            .map_err(|e| ShippingError::Destination(e.status(), e.to_string()))?;

        match resp.status() {
            StatusCode::OK => Ok(()),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(ShippingError::Destination(Some(status), body))
            }
        }
    }
}
