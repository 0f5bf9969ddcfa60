use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::schema::Profile;
use crate::util::{TimeRange, strip_photo_size_suffix};

// ------------------------------------------------------------
// Aggregate request
// ------------------------------------------------------------
//
// Body of `POST users/me/dataset:aggregate`. A single bucket
// spanning the whole range is requested, so a well-formed reply
// carries at most one value.
//
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    pub aggregate_by: Vec<AggregateBy>,
    pub bucket_by_time: BucketByTime,
    pub start_time_millis: i64,
    pub end_time_millis: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateBy {
    pub data_type_name: String,
    pub data_source_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketByTime {
    pub duration_millis: i64,
}

impl AggregateRequest {
    pub fn single_bucket(range: TimeRange, data_type_name: &str, data_source_id: &str) -> Self {
        Self {
            aggregate_by: vec![AggregateBy {
                data_type_name: data_type_name.to_string(),
                data_source_id: data_source_id.to_string(),
            }],
            bucket_by_time: BucketByTime {
                duration_millis: range.duration_millis(),
            },
            start_time_millis: range.start_millis(),
            end_time_millis: range.end_millis(),
        }
    }
}

// ------------------------------------------------------------
// Aggregate response
// ------------------------------------------------------------
//
// bucket -> dataset -> point -> value
//
// Only the pieces needed for step extraction are modelled.
// Missing nested arrays default to empty; a missing top-level
// `bucket` array is treated as malformed.
//
#[derive(Debug, Deserialize)]
pub struct AggregateResponse {
    pub bucket: Option<Vec<Bucket>>,
}

#[derive(Debug, Deserialize)]
pub struct Bucket {
    #[serde(default)]
    pub dataset: Vec<Dataset>,
}

#[derive(Debug, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub point: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
pub struct DataPoint {
    #[serde(default)]
    pub value: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Value {
    pub int_val: Option<i64>,
}

impl AggregateResponse {
    /// Returns the first integer value found, walking buckets in order.
    ///
    /// Later buckets, points and values are ignored rather than
    /// summed. An empty but well-formed response means zero steps.
    pub fn first_step_count(&self) -> Result<u64, FetchError> {
        let buckets = self
            .bucket
            .as_ref()
            .ok_or_else(|| FetchError::Malformed("aggregate response has no bucket array".into()))?;

        let first = buckets
            .iter()
            .flat_map(|b| &b.dataset)
            .flat_map(|d| &d.point)
            .flat_map(|p| &p.value)
            .find_map(|v| v.int_val);

        match first {
            None => Ok(0),
            Some(steps) => u64::try_from(steps)
                .map_err(|_| FetchError::Malformed(format!("negative step count {}", steps))),
        }
    }
}

// ------------------------------------------------------------
// People response
// ------------------------------------------------------------
//
// `GET people/me?personFields=photos,names`
//
#[derive(Debug, Deserialize)]
pub struct PersonResponse {
    #[serde(default)]
    pub names: Vec<Name>,
    #[serde(default)]
    pub photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Name {
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Photo {
    pub url: Option<String>,
}

impl PersonResponse {
    /// The last listed name and photo win.
    pub fn into_profile(self) -> Profile {
        let name = self.names.into_iter().last().and_then(|n| n.display_name);
        let photo_url = self
            .photos
            .into_iter()
            .last()
            .and_then(|p| p.url)
            .map(|url| strip_photo_size_suffix(&url).to_string());

        Profile { name, photo_url }
    }
}

// ------------------------------------------------------------
// Token refresh
// ------------------------------------------------------------
//
// `POST token` with a `refresh_token` grant. Only the new access
// token and its lifetime are read back.
//
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub grant_type: &'static str,
    pub refresh_token: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

impl<'a> RefreshRequest<'a> {
    pub fn new(refresh_token: &'a str, client_id: &'a str, client_secret: &'a str) -> Self {
        Self {
            grant_type: "refresh_token",
            refresh_token,
            client_id,
            client_secret,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}
