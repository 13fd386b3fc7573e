pub mod error;
pub mod types;

pub use error::{FirmsError, Result};
pub use types::{CountryQuery, FirmsRecord};

use std::time::Duration;

const BASE_URL: &str = "https://firms.modaps.eosdis.nasa.gov/api";

/// Columns every usable FIRMS CSV carries. A body without them is an API
/// message (bad key, quota exceeded), not data.
const REQUIRED_COLUMNS: [&str; 3] = ["latitude", "longitude", "acq_date"];

pub struct FirmsClient {
    client: reqwest::Client,
    map_key: String,
    base_url: String,
}

impl FirmsClient {
    pub fn new(map_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            map_key,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Point the client at a different host (tests, mirrors).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch active-fire detections for a country and parse the CSV body.
    pub async fn country_detections(&self, query: &CountryQuery) -> Result<Vec<FirmsRecord>> {
        let url = format!(
            "{}/country/csv/{}/{}/{}/{}",
            self.base_url, self.map_key, query.source, query.country, query.day_range
        );
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FirmsError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let records = parse_csv(&body)?;
        tracing::debug!(
            source = %query.source,
            country = %query.country,
            records = records.len(),
            "FIRMS feed fetched"
        );
        Ok(records)
    }
}

/// Parse a FIRMS CSV body into header-keyed records.
pub fn parse_csv(body: &str) -> Result<Vec<FirmsRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(body.as_bytes());

    let headers = reader.headers()?.clone();
    if let Some(missing) = REQUIRED_COLUMNS
        .iter()
        .find(|col| !headers.iter().any(|h| h == **col))
    {
        let preview: String = body.chars().take(120).collect();
        return Err(FirmsError::Parse(format!(
            "missing column {missing:?} in feed body: {preview:?}"
        )));
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record: FirmsRecord = headers
            .iter()
            .zip(row.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
country_id,latitude,longitude,bright_ti4,scan,track,acq_date,acq_time,satellite,instrument,confidence,version,bright_ti5,frp,daynight
GRC,38.09012,23.82113,340.55,0.39,0.44,2024-08-11,1042,N,VIIRS,n,2.0NRT,296.36,7.49,D
GRC,38.09401,23.82567,333.01,0.39,0.44,2024-08-11,1042,N,VIIRS,n,2.0NRT,295.12,5.02,D
";

    #[test]
    fn parses_rows_keyed_by_header() {
        let records = parse_csv(SAMPLE).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["latitude"], "38.09012");
        assert_eq!(records[1]["acq_date"], "2024-08-11");
        assert_eq!(records[1]["satellite"], "N");
        assert_eq!(records[0].len(), 15);
    }

    #[test]
    fn header_only_body_is_empty() {
        let body = SAMPLE.lines().next().unwrap();
        assert!(parse_csv(body).unwrap().is_empty());
    }

    #[test]
    fn api_message_is_a_parse_error() {
        let err = parse_csv("Invalid MAP_KEY.").unwrap_err();
        assert!(matches!(err, FirmsError::Parse(_)), "got {err:?}");
    }

    #[test]
    fn ragged_rows_are_a_parse_error() {
        let body = "latitude,longitude,acq_date\n38.0,23.0\n";
        assert!(matches!(parse_csv(body), Err(FirmsError::Parse(_))));
    }

    #[test]
    fn day_range_is_clamped() {
        assert_eq!(CountryQuery::new("MODIS_NRT", "GRC", 0).day_range, 1);
        assert_eq!(CountryQuery::new("MODIS_NRT", "GRC", 30).day_range, 10);
    }
}
