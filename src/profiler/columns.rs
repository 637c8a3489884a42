//! Per-column classification
//!
//! Two signals are combined for every column:
//!
//! 1. the reported dtype, which decides numeric / datetime / categorical;
//! 2. the column name, matched against naming-convention pattern families.
//!
//! Name patterns only ever add traits. A float column called `latitude` is
//! numeric *and* geo; a string column called `created_at` is categorical
//! *and* datetime.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DATETIME_NAME: Regex = Regex::new(
        r"(^|_)(date|dates|time|timestamp|datetime|day|month|year|week|quarter|period|dt)($|_)|_(at|on)$"
    )
    .expect("valid datetime name pattern");
    static ref GEO_NAME: Regex = Regex::new(
        r"(^|_)(lat|latitude|lon|lng|long|longitude|country|city|state|province|region|zip|zipcode|postal|postcode|address|geo|location|coords?)($|_)"
    )
    .expect("valid geo name pattern");
    static ref TEXT_NAME: Regex = Regex::new(
        r"(^|_)(description|desc|comment|comments|review|reviews|text|note|notes|message|body|summary|title|feedback|content|tweet)($|_)"
    )
    .expect("valid text name pattern");
    static ref ID_NAME: Regex =
        Regex::new(r"^(id|uuid|guid)$|(^|_)(id|uuid|guid|key)$|^id_|_(no|num|number|code)$")
            .expect("valid identifier name pattern");
    static ref AMOUNT_NAME: Regex = Regex::new(
        r"(^|_)(amount|amt|price|cost|costs|revenue|sales|total|payment|fee|fees|balance|spend|spent|profit|income|charge|paid|tax|discount|subtotal)($|_)"
    )
    .expect("valid amount name pattern");
    static ref CAMEL_BOUNDARY: Regex = Regex::new(r"([a-z0-9])([A-Z])").expect("valid camel pattern");
    static ref SEPARATORS: Regex = Regex::new(r"[^a-z0-9]+").expect("valid separator pattern");
}

/// Traits assigned to a single column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnTraits {
    pub numeric: bool,
    pub datetime: bool,
    pub categorical: bool,
    pub geo: bool,
    pub text: bool,
    pub identifier: bool,
    pub amount: bool,
}

/// `OrderDate`, `order-date` and `Order Date` all become `order_date`
pub fn normalize_name(name: &str) -> String {
    let split = CAMEL_BOUNDARY.replace_all(name.trim(), "${1}_${2}");
    let lower = split.to_ascii_lowercase();
    SEPARATORS
        .replace_all(&lower, "_")
        .trim_matches('_')
        .to_string()
}

fn dtype_is_numeric(dtype: &str) -> bool {
    let d = dtype.to_ascii_lowercase();
    d.starts_with("int") || d.starts_with("uint") || d.starts_with("float") || d.starts_with("complex")
}

fn dtype_is_datetime(dtype: &str) -> bool {
    let d = dtype.to_ascii_lowercase();
    d.starts_with("datetime") || d.starts_with("timedelta") || d.starts_with("period")
}

fn dtype_is_categorical(dtype: &str) -> bool {
    matches!(
        dtype.to_ascii_lowercase().as_str(),
        "object" | "category" | "string" | "str" | "bool" | "boolean"
    )
}

/// Classify one column from its name and reported dtype
pub fn classify(name: &str, dtype: &str) -> ColumnTraits {
    let normalized = normalize_name(name);
    let numeric = dtype_is_numeric(dtype);

    ColumnTraits {
        numeric,
        datetime: dtype_is_datetime(dtype) || DATETIME_NAME.is_match(&normalized),
        categorical: dtype_is_categorical(dtype),
        geo: GEO_NAME.is_match(&normalized),
        // A numeric column is never free text, whatever it is called
        text: !numeric && TEXT_NAME.is_match(&normalized),
        identifier: ID_NAME.is_match(&normalized),
        amount: AMOUNT_NAME.is_match(&normalized),
    }
}

/// Column counts that the category scoring and strategy gates read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnCensus {
    pub total: usize,
    pub numeric: usize,
    pub categorical: usize,
    pub datetime: usize,
    pub geo: usize,
    pub text: usize,
    pub identifier: usize,
    pub amount: usize,
    /// Columns with at least one null
    pub with_missing: usize,
}

impl ColumnCensus {
    pub fn add(&mut self, traits: ColumnTraits, nulls: usize) {
        self.total += 1;
        self.numeric += traits.numeric as usize;
        self.categorical += traits.categorical as usize;
        self.datetime += traits.datetime as usize;
        self.geo += traits.geo as usize;
        self.text += traits.text as usize;
        self.identifier += traits.identifier as usize;
        self.amount += traits.amount as usize;
        self.with_missing += (nulls > 0) as usize;
    }

    pub fn numeric_ratio(&self) -> f64 {
        ratio(self.numeric, self.total)
    }

    pub fn categorical_ratio(&self) -> f64 {
        ratio(self.categorical, self.total)
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("OrderDate"), "order_date");
        assert_eq!(normalize_name("  Unit Price ($) "), "unit_price");
        assert_eq!(normalize_name("customer-id"), "customer_id");
    }

    #[test]
    fn test_dtype_signal() {
        let t = classify("value", "float64");
        assert!(t.numeric && !t.categorical && !t.datetime);

        let t = classify("when", "datetime64[ns]");
        assert!(t.datetime && !t.numeric);

        let t = classify("flag", "bool");
        assert!(t.categorical);
    }

    #[test]
    fn test_name_adds_but_never_removes() {
        // numeric coordinate stays numeric and gains geo
        let t = classify("latitude", "float64");
        assert!(t.numeric && t.geo);

        // string date column stays categorical and gains datetime
        let t = classify("created_at", "object");
        assert!(t.categorical && t.datetime);
    }

    #[test]
    fn test_multiple_name_tags() {
        let t = classify("total_amount_id", "int64");
        assert!(t.amount && t.identifier && t.numeric);
    }

    #[test]
    fn test_numeric_column_is_not_text() {
        assert!(!classify("review", "int64").text);
        assert!(classify("review", "object").text);
    }

    #[test]
    fn test_identifier_patterns() {
        assert!(classify("id", "int64").identifier);
        assert!(classify("CustomerID", "object").identifier);
        assert!(classify("invoice_no", "object").identifier);
        assert!(!classify("idea", "object").identifier);
    }

    #[test]
    fn test_census_ratios() {
        let mut census = ColumnCensus::default();
        census.add(classify("a", "int64"), 0);
        census.add(classify("b", "object"), 3);
        assert_eq!(census.total, 2);
        assert_eq!(census.with_missing, 1);
        assert!((census.numeric_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
