use serde::Deserialize;

use super::error::ApiError;

/// The `state`/`errno` envelope every 115 endpoint wraps its payload in.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    #[serde(default)]
    pub state: bool,
    #[serde(default)]
    pub errno: Option<i64>,
    /// Some endpoints spell it camel-cased.
    #[serde(default, rename = "errNo")]
    pub err_no: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
    /// Listing endpoints report the total item count beside the payload.
    #[serde(default)]
    pub count: Option<u64>,
}

impl<T> Envelope<T> {
    pub fn errno(&self) -> Option<i64> {
        self.errno.or(self.err_no)
    }

    /// Unwrap the payload, mapping a failure envelope or a missing payload
    /// to `Upstream`. `what` names the call for the error message.
    pub fn into_data(self, what: &str) -> Result<T, ApiError> {
        if !self.state {
            return Err(ApiError::Upstream {
                errno: self.errno(),
                message: format!(
                    "{what} failed: {}",
                    self.error.as_deref().unwrap_or("no error detail")
                ),
            });
        }
        self.data.ok_or_else(|| ApiError::Upstream {
            errno: None,
            message: format!("{what} returned an empty payload"),
        })
    }
}

/// A file or directory from an account or share directory listing.
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct RemoteFile {
    #[serde(deserialize_with = "u64_string_or_number")]
    pub id: u64,
    #[serde(default, deserialize_with = "opt_u64_string_or_number")]
    pub parent_id: Option<u64>,
    pub name: String,
    /// Listing endpoints have historically used both spellings for the
    /// same token; treat them as one field.
    #[serde(default, alias = "pick_code")]
    pub pickcode: Option<String>,
    /// Same upstream quirk as `pickcode`.
    #[serde(default, alias = "is_directory")]
    pub is_dir: bool,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Share metadata from the share-info endpoint.
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct ShareInfo {
    pub receive_code: String,
    #[serde(default)]
    pub share_title: Option<String>,
}

/// Paginated payload of the share listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SharePage {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub list: Vec<RemoteFile>,
}

/// Payload of the share name-search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub list: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "fid", deserialize_with = "u64_string_or_number")]
    pub id: u64,
    #[serde(rename = "n")]
    pub name: String,
}

/// Ancestor chain of a directory, used to rebuild its absolute path.
#[derive(Debug, Clone, Deserialize)]
pub struct DirInfo {
    #[serde(default)]
    pub paths: Vec<PathNode>,
    pub file_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathNode {
    #[serde(deserialize_with = "u64_string_or_number")]
    pub file_id: u64,
    pub file_name: String,
}

/// Directory id looked up by path. The remote reports a missing path as
/// id 0 rather than a failure envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct DirId {
    #[serde(deserialize_with = "u64_string_or_number")]
    pub id: u64,
}

/// A normalized download-info payload, independent of the wire variant
/// that produced it. `file_name` is `None` when the variant does not echo
/// it and it must be derived from the URL path.
#[derive(Debug, Clone)]
pub struct DownloadPayload {
    pub url: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

/// One account activity event from the behavior feed.
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct ActivityEvent {
    /// Numeric event type code, see [`ActivityKind`].
    #[serde(rename = "type")]
    pub kind: i64,
    #[serde(default, rename = "pick_code", alias = "pickcode")]
    pub pickcode: String,
    pub file_name: String,
    #[serde(deserialize_with = "u64_string_or_number")]
    pub parent_id: u64,
    #[serde(default)]
    pub update_time: i64,
    #[serde(default, deserialize_with = "opt_u64_string_or_number")]
    pub id: Option<u64>,
}

/// Paginated payload of the behavior feed.
#[derive(Debug, Clone, Deserialize)]
pub struct BehaviorPage {
    #[serde(default)]
    pub list: Vec<ActivityEvent>,
    #[serde(default)]
    pub last_data: Option<String>,
}

/// The activity event types that drive incremental sync. All other codes
/// are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    UploadImage,
    UploadFile,
    MoveFile,
    ReceiveFiles,
}

impl ActivityKind {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::UploadImage),
            2 => Some(Self::UploadFile),
            6 => Some(Self::MoveFile),
            14 => Some(Self::ReceiveFiles),
            _ => None,
        }
    }
}

/// Validate a pickcode before any network call: exactly 17 alphanumeric
/// characters, normalized to lowercase.
pub fn validate_pickcode(input: &str) -> Result<String, ApiError> {
    if input.len() == 17 && input.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(input.to_ascii_lowercase())
    } else {
        Err(ApiError::Validation(format!("bad pickcode: {input:?}")))
    }
}

/// Deserialize a value the remote serves as either a JSON string or a
/// JSON number.
pub(crate) fn u64_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumber;

    impl<'de> de::Visitor<'de> for StringOrNumber {
        type Value = u64;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a string or a number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            v.parse().map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

pub(crate) fn opt_u64_string_or_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrap(#[serde(deserialize_with = "u64_string_or_number")] u64);

    let v: Option<Wrap> = Option::deserialize(deserializer)?;
    Ok(v.map(|w| w.0))
}
