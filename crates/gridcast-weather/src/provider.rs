//! Ultra-short-term forecast retrieval for one grid cell.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta, Timelike};
use gridcast_core::ForecastConfig;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use crate::types::{FetchError, ForecastCategory, ForecastObservation, GridCell};

/// Provider result code for a normal response
const RESULT_OK: &str = "00";

#[derive(Debug, Deserialize)]
struct Envelope {
    response: ResponsePart,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    header: Option<Header>,
    body: Option<Body>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    result_code: String,
    #[serde(default)]
    result_msg: String,
}

#[derive(Debug, Deserialize)]
struct Body {
    items: Items,
}

#[derive(Debug, Deserialize)]
struct Items {
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    category: String,
    fcst_time: String,
    fcst_value: serde_json::Value,
}

impl TryFrom<Item> for ForecastObservation {
    type Error = FetchError;

    fn try_from(item: Item) -> Result<Self, Self::Error> {
        let value = match item.fcst_value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(FetchError::Parse(format!(
                    "unexpected fcstValue for {}: {}",
                    item.category, other
                )))
            }
        };

        Ok(Self {
            category: ForecastCategory::from_code(&item.category),
            time_bucket: item.fcst_time,
            value,
        })
    }
}

/// `base_date` for a request issued at `as_of`: its calendar date, YYYYMMDD.
pub fn base_date(as_of: &DateTime<FixedOffset>) -> String {
    as_of.format("%Y%m%d").to_string()
}

/// `base_time` for a request issued at `as_of`: one hour earlier, on the hour.
pub fn base_time(as_of: &DateTime<FixedOffset>) -> String {
    let earlier = *as_of - TimeDelta::hours(1);
    format!("{:02}00", earlier.hour())
}

/// Client for the forecast HTTP service.
#[derive(Debug, Clone)]
pub struct ForecastFetcher {
    client: Client,
    base_url: String,
    service_key: Option<String>,
    num_of_rows: u32,
}

impl ForecastFetcher {
    pub fn new(config: &ForecastConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            service_key: config.service_key.clone(),
            num_of_rows: config.num_of_rows,
        })
    }

    /// Query parameters for `grid` as of `as_of`, service key excluded.
    pub fn query_params(
        &self,
        grid: GridCell,
        as_of: &DateTime<FixedOffset>,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("dataType", "JSON".to_string()),
            ("base_date", base_date(as_of)),
            ("base_time", base_time(as_of)),
            ("nx", grid.nx.to_string()),
            ("ny", grid.ny.to_string()),
            ("numOfRows", self.num_of_rows.to_string()),
        ]
    }

    /// Fetch every forecast line item for `grid`.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch(
        &self,
        grid: GridCell,
        as_of: DateTime<FixedOffset>,
    ) -> Result<Vec<ForecastObservation>, FetchError> {
        let service_key = self
            .service_key
            .as_deref()
            .ok_or(FetchError::MissingServiceKey)?;

        let mut params = vec![("serviceKey", service_key.to_string())];
        params.extend(self.query_params(grid, &as_of));
        tracing::debug!("Requesting forecast for {} with {:?}", grid, &params[1..]);

        let response = self.client.get(&self.base_url).query(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let observations = parse_forecast(&text)?;
        tracing::debug!("Parsed {} forecast items", observations.len());
        Ok(observations)
    }
}

/// Parse a forecast response body into observations.
///
/// A missing level anywhere on `response.body.items.item[]` is an error.
pub fn parse_forecast(text: &str) -> Result<Vec<ForecastObservation>, FetchError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| FetchError::Parse(e.to_string()))?;

    if let Some(header) = envelope.response.header {
        if header.result_code != RESULT_OK {
            return Err(FetchError::Service {
                code: header.result_code,
                message: header.result_msg,
            });
        }
    }

    let body = envelope
        .response
        .body
        .ok_or_else(|| FetchError::Parse("missing response.body".to_string()))?;

    body.items
        .item
        .into_iter()
        .map(ForecastObservation::try_from)
        .collect()
}
