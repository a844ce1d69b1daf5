use crate::catalog::Service;
use crate::types::{Availability, BookingConfirmation, BookingRequest};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use reqwest::{Response, StatusCode};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Slot already taken: {0}")]
    Conflict(String),

    #[error("Server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Slot {start} on {date} is not available")]
    SlotUnavailable { date: NaiveDate, start: NaiveTime },

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("{start} on {date} can't be booked for the requested service")]
    InvalidSlot { date: NaiveDate, start: NaiveTime },
}

impl ClientError {
    /// The slot was taken by someone else, either seen locally or reported by the server.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ClientError::Conflict(_) | ClientError::SlotUnavailable { .. }
        )
    }
}

/// Remote operations of the booking server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SlotApi: Send + Sync {
    async fn services(&self) -> Result<Vec<Service>, ClientError>;
    async fn availability(&self, date: NaiveDate) -> Result<Availability, ClientError>;
    async fn book(&self, request: &BookingRequest) -> Result<BookingConfirmation, ClientError>;
    async fn cancel(&self, id: Uuid) -> Result<BookingConfirmation, ClientError>;
}

#[derive(Debug, Clone)]
pub struct HttpSlotApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSlotApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::CONFLICT => Err(ClientError::Conflict(message)),
            _ => Err(ClientError::Rejected {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

#[async_trait]
impl SlotApi for HttpSlotApi {
    async fn services(&self) -> Result<Vec<Service>, ClientError> {
        let response = self
            .client
            .get(format!("{}/services", self.base_url))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn availability(&self, date: NaiveDate) -> Result<Availability, ClientError> {
        let response = self
            .client
            .get(format!("{}/availability/{date}", self.base_url))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn book(&self, request: &BookingRequest) -> Result<BookingConfirmation, ClientError> {
        let response = self
            .client
            .post(format!("{}/bookings", self.base_url))
            .json(request)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn cancel(&self, id: Uuid) -> Result<BookingConfirmation, ClientError> {
        let response = self
            .client
            .delete(format!("{}/bookings/{id}", self.base_url))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
