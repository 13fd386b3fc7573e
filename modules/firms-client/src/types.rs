use std::collections::BTreeMap;

/// One CSV row from the FIRMS feed: column header → cell text.
pub type FirmsRecord = BTreeMap<String, String>;

/// Which slice of the FIRMS country feed to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryQuery {
    /// Satellite product, e.g. `VIIRS_SNPP_NRT` or `MODIS_NRT`.
    pub source: String,
    /// ISO 3166-1 alpha-3 country code.
    pub country: String,
    /// Number of days of detections to return (1..=10).
    pub day_range: u32,
}

impl CountryQuery {
    pub fn new(source: impl Into<String>, country: impl Into<String>, day_range: u32) -> Self {
        Self {
            source: source.into(),
            country: country.into(),
            day_range: day_range.clamp(1, 10),
        }
    }
}
