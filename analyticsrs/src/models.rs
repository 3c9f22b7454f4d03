//! Dimension model: the immutable value objects describing one analytics query.
//!
//! A [`DimensionalQuery`] is assembled through [`DimensionalQueryBuilder`], which
//! validates every identifier that later reaches SQL text. Derived copies (for
//! example the security-narrowed query) are produced with
//! [`DimensionalQuery::to_builder`]; nothing mutates a built query.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::partition::PartitionSet;

pub type DimensionId = String;
pub type ItemId = String;

pub const DATA_X_DIM_ID: &str = "dx";
pub const PERIOD_DIM_ID: &str = "pe";
pub const ORGUNIT_DIM_ID: &str = "ou";
pub const ENROLLMENT_OU_DIM_ID: &str = "enrollmentou";
pub const DEFAULT_VALUE_COLUMN: &str = "value";

/// How far back FIRST/LAST aggregation looks for a value.
pub const FIRST_LAST_LOOKBACK_YEARS: u32 = 10;

/// Dimension ids carried by dedicated query fields rather than generic dimensions.
const RESERVED_DIMENSION_IDS: [&str; 4] = [
    DATA_X_DIM_ID,
    PERIOD_DIM_ID,
    ORGUNIT_DIM_ID,
    ENROLLMENT_OU_DIM_ID,
];

/// True when `ident` can be emitted as a bare SQL identifier.
pub fn is_valid_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_identifier(kind: &str, ident: &str) -> Result<()> {
    if is_valid_identifier(ident) {
        Ok(())
    } else {
        Err(AnalyticsError::IllegalQuery(format!(
            "{kind} `{ident}` is not a valid identifier"
        )))
    }
}

// ============================================================================
// Periods
// ============================================================================

/// Granularity of a period. The analytics table stores the ISO period of
/// every granularity in a column named after it (`yearly`, `monthly`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Daily,
    Monthly,
    Quarterly,
    Yearly,
}

impl PeriodType {
    pub fn column_name(&self) -> &'static str {
        match self {
            PeriodType::Daily => "daily",
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
            PeriodType::Yearly => "yearly",
        }
    }
}

/// A time range identified by its ISO period string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub iso: String,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Period {
    pub fn new(
        iso: impl Into<String>,
        period_type: PeriodType,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self> {
        let iso = iso.into();
        if start_date > end_date {
            return Err(AnalyticsError::IllegalQuery(format!(
                "period {iso} starts after it ends"
            )));
        }
        Ok(Self {
            iso,
            period_type,
            start_date,
            end_date,
        })
    }

    /// Parse a yearly (`2021`), quarterly (`2021Q1`), monthly (`202103`) or
    /// daily (`20210315`) ISO period.
    pub fn parse(iso: &str) -> Result<Self> {
        let illegal = || AnalyticsError::IllegalQuery(format!("unsupported period `{iso}`"));
        let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

        let (period_type, start, end) = match iso.len() {
            4 if digits(iso) => {
                let year: i32 = iso.parse().map_err(|_| illegal())?;
                let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(illegal)?;
                let end = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(illegal)?;
                (PeriodType::Yearly, start, end)
            }
            6 if iso.as_bytes()[4] == b'Q' && digits(&iso[..4]) && digits(&iso[5..]) => {
                let year: i32 = iso[..4].parse().map_err(|_| illegal())?;
                let quarter: u32 = iso[5..].parse().map_err(|_| illegal())?;
                if !(1..=4).contains(&quarter) {
                    return Err(illegal());
                }
                let start =
                    NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1).ok_or_else(illegal)?;
                (PeriodType::Quarterly, start, month_end(start, 3).ok_or_else(illegal)?)
            }
            6 if digits(iso) => {
                let year: i32 = iso[..4].parse().map_err(|_| illegal())?;
                let month: u32 = iso[4..].parse().map_err(|_| illegal())?;
                let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(illegal)?;
                (PeriodType::Monthly, start, month_end(start, 1).ok_or_else(illegal)?)
            }
            8 if digits(iso) => {
                let day = NaiveDate::parse_from_str(iso, "%Y%m%d").map_err(|_| illegal())?;
                (PeriodType::Daily, day, day)
            }
            _ => return Err(illegal()),
        };

        Self::new(iso, period_type, start, end)
    }

    /// Calendar years touched by this period, ascending.
    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start_date.year()..=self.end_date.year()
    }
}

fn month_end(start: NaiveDate, months: u32) -> Option<NaiveDate> {
    start
        .checked_add_months(Months::new(months))
        .and_then(|d| d.pred_opt())
}

// ============================================================================
// Organisation units and items
// ============================================================================

/// Reference to an organisation unit with its `/`-separated ancestry path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrgUnitRef {
    pub uid: String,
    pub path: String,
}

impl OrgUnitRef {
    pub fn new(uid: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            path: path.into(),
        }
    }

    pub fn root(uid: impl Into<String>) -> Self {
        let uid = uid.into();
        let path = format!("/{uid}");
        Self { uid, path }
    }

    pub fn child(&self, uid: impl Into<String>) -> Self {
        let uid = uid.into();
        let path = format!("{}/{uid}", self.path);
        Self { uid, path }
    }

    /// Hierarchy level, 1 for a root.
    pub fn level(&self) -> usize {
        self.path.split('/').filter(|s| !s.is_empty()).count()
    }

    pub fn is_descendant_or_self_of(&self, other: &OrgUnitRef) -> bool {
        self.path == other.path || self.path.starts_with(&format!("{}/", other.path))
    }
}

/// Resolves organisation-unit uids to their place in the hierarchy.
pub trait OrgUnitProvider: Send + Sync {
    fn org_unit(&self, uid: &str) -> Result<OrgUnitRef>;
}

/// In-memory organisation-unit hierarchy keyed by uid.
#[derive(Debug, Clone, Default)]
pub struct OrgUnitHierarchy {
    units: BTreeMap<String, OrgUnitRef>,
}

impl OrgUnitHierarchy {
    pub fn from_units(units: impl IntoIterator<Item = OrgUnitRef>) -> Self {
        Self {
            units: units.into_iter().map(|u| (u.uid.clone(), u)).collect(),
        }
    }

    /// Load a YAML list of `{uid, path}` entries.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AnalyticsError::Settings(format!(
                "failed to read organisation units {}: {e}",
                path.display()
            ))
        })?;
        let units: Vec<OrgUnitRef> = serde_yaml::from_str(&content)?;
        Ok(Self::from_units(units))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl OrgUnitProvider for OrgUnitHierarchy {
    fn org_unit(&self, uid: &str) -> Result<OrgUnitRef> {
        self.units
            .get(uid)
            .cloned()
            .ok_or_else(|| {
                AnalyticsError::IllegalQuery(format!("unknown organisation unit `{uid}`"))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataItemRef {
    pub uid: String,
}

impl DataItemRef {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

/// A generic output dimension such as a category (`co`, `ao`, group sets).
/// An empty item set means "every item of the dimension".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionItems {
    pub id: DimensionId,
    pub items: BTreeSet<ItemId>,
}

/// How requested organisation units expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgUnitMode {
    Selected,
    #[default]
    Descendants,
    Children,
    Accessible,
    All,
}

impl OrgUnitMode {
    pub fn requires_explicit_units(&self) -> bool {
        matches!(
            self,
            OrgUnitMode::Selected | OrgUnitMode::Descendants | OrgUnitMode::Children
        )
    }
}

// ============================================================================
// Measures and aggregation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeasureFilter {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl MeasureFilter {
    pub fn sql_operator(&self) -> &'static str {
        match self {
            MeasureFilter::Eq => "=",
            MeasureFilter::Gt => ">",
            MeasureFilter::Ge => ">=",
            MeasureFilter::Lt => "<",
            MeasureFilter::Le => "<=",
        }
    }
}

impl FromStr for MeasureFilter {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EQ" => Ok(MeasureFilter::Eq),
            "GT" => Ok(MeasureFilter::Gt),
            "GE" => Ok(MeasureFilter::Ge),
            "LT" => Ok(MeasureFilter::Lt),
            "LE" => Ok(MeasureFilter::Le),
            other => Err(AnalyticsError::IllegalQuery(format!(
                "measure criteria operator `{other}` has no SQL mapping"
            ))),
        }
    }
}

impl fmt::Display for MeasureFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            MeasureFilter::Eq => "EQ",
            MeasureFilter::Gt => "GT",
            MeasureFilter::Ge => "GE",
            MeasureFilter::Lt => "LT",
            MeasureFilter::Le => "LE",
        };
        f.write_str(token)
    }
}

/// Insertion-ordered mapping from operator to numeric threshold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasureCriteria(Vec<(MeasureFilter, f64)>);

impl MeasureCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a criterion; an operator already present keeps its position.
    pub fn insert(&mut self, filter: MeasureFilter, threshold: f64) {
        match self.0.iter_mut().find(|(f, _)| *f == filter) {
            Some(entry) => entry.1 = threshold,
            None => self.0.push((filter, threshold)),
        }
    }

    pub fn with(mut self, filter: MeasureFilter, threshold: f64) -> Self {
        self.insert(filter, threshold);
        self
    }

    pub fn get(&self, filter: MeasureFilter) -> Option<f64> {
        self.0.iter().find(|(f, _)| *f == filter).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeasureFilter, f64)> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Parses the `GT:0;LE:100` request form.
impl FromStr for MeasureCriteria {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        let mut criteria = MeasureCriteria::new();
        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (op, value) = part.split_once(':').ok_or_else(|| {
                AnalyticsError::IllegalQuery(format!("malformed measure criterion `{part}`"))
            })?;
            let filter: MeasureFilter = op.parse()?;
            let threshold: f64 = value.trim().parse().map_err(|_| {
                AnalyticsError::IllegalQuery(format!("measure criterion `{part}` is not numeric"))
            })?;
            if !threshold.is_finite() {
                return Err(AnalyticsError::IllegalQuery(format!(
                    "measure criterion `{part}` is not finite"
                )));
            }
            criteria.insert(filter, threshold);
        }
        Ok(criteria)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Aggregation {
    #[default]
    Sum,
    Avg,
    Count,
    Stddev,
    Variance,
    Min,
    Max,
    None,
    First,
    Last,
}

impl Aggregation {
    pub fn is_first_or_last(&self) -> bool {
        matches!(self, Aggregation::First | Aggregation::Last)
    }

    pub fn is_aggregating(&self) -> bool {
        !matches!(self, Aggregation::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    #[default]
    Numeric,
    Text,
    Boolean,
}

// ============================================================================
// DimensionalQuery
// ============================================================================

/// One dimensional analytics query. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionalQuery {
    table_name: String,
    periods: Vec<Period>,
    organisation_units: BTreeSet<OrgUnitRef>,
    org_unit_mode: OrgUnitMode,
    enrollment_org_units: BTreeSet<OrgUnitRef>,
    org_unit_filters: BTreeSet<OrgUnitRef>,
    data_items: Vec<DataItemRef>,
    dimensions: Vec<DimensionItems>,
    filters: BTreeMap<DimensionId, BTreeSet<ItemId>>,
    measure_criteria: MeasureCriteria,
    pre_aggregate_measure_criteria: MeasureCriteria,
    aggregation: Aggregation,
    data_type: DataType,
    value_column: String,
    partitions: Option<PartitionSet>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl DimensionalQuery {
    pub fn builder(table_name: impl Into<String>) -> DimensionalQueryBuilder {
        DimensionalQueryBuilder::new(table_name)
    }

    /// Start a builder pre-populated with this query, for deriving a copy.
    pub fn to_builder(&self) -> DimensionalQueryBuilder {
        DimensionalQueryBuilder {
            query: self.clone(),
        }
    }

    /// Build a query from its wire form. Organisation-unit uids are resolved
    /// through `org_units`; ancestry is never taken from the request.
    pub fn from_request(
        request: &QueryRequest,
        org_units: &dyn OrgUnitProvider,
    ) -> Result<Self> {
        let resolve = |uids: &[String]| -> Result<Vec<OrgUnitRef>> {
            uids.iter().map(|uid| org_units.org_unit(uid)).collect()
        };
        let mut builder = DimensionalQuery::builder(&request.table)
            .org_unit_mode(request.org_unit_mode)
            .organisation_units(resolve(&request.organisation_units)?)
            .enrollment_org_units(resolve(&request.enrollment_org_units)?)
            .org_unit_filters(resolve(&request.org_unit_filters)?)
            .data_items(request.data_items.iter().map(DataItemRef::new))
            .aggregation(request.aggregation)
            .data_type(request.data_type);

        for iso in &request.periods {
            builder = builder.period(Period::parse(iso)?);
        }
        for (id, items) in &request.dimensions {
            builder = builder.dimension(id, items.iter().cloned());
        }
        for (id, items) in &request.filters {
            builder = builder.filter(id, items.iter().cloned());
        }
        if let Some(raw) = &request.measure_criteria {
            builder = builder.measure_criteria(raw.parse()?);
        }
        if let Some(raw) = &request.pre_aggregate_measure_criteria {
            builder = builder.pre_aggregate_measure_criteria(raw.parse()?);
        }
        if let Some(column) = &request.value_column {
            builder = builder.value_column(column);
        }
        if let Some(date) = request.start_date {
            builder = builder.start_date(date);
        }
        if let Some(date) = request.end_date {
            builder = builder.end_date(date);
        }
        builder.build()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn organisation_units(&self) -> &BTreeSet<OrgUnitRef> {
        &self.organisation_units
    }

    pub fn org_unit_mode(&self) -> OrgUnitMode {
        self.org_unit_mode
    }

    pub fn enrollment_org_units(&self) -> &BTreeSet<OrgUnitRef> {
        &self.enrollment_org_units
    }

    /// Organisation units restricting rows without becoming an output column.
    pub fn org_unit_filters(&self) -> &BTreeSet<OrgUnitRef> {
        &self.org_unit_filters
    }

    pub fn data_items(&self) -> &[DataItemRef] {
        &self.data_items
    }

    pub fn dimensions(&self) -> &[DimensionItems] {
        &self.dimensions
    }

    pub fn dimension(&self, id: &str) -> Option<&DimensionItems> {
        self.dimensions.iter().find(|d| d.id == id)
    }

    pub fn filters(&self) -> &BTreeMap<DimensionId, BTreeSet<ItemId>> {
        &self.filters
    }

    pub fn measure_criteria(&self) -> &MeasureCriteria {
        &self.measure_criteria
    }

    pub fn pre_aggregate_measure_criteria(&self) -> &MeasureCriteria {
        &self.pre_aggregate_measure_criteria
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn value_column(&self) -> &str {
        &self.value_column
    }

    pub fn partitions(&self) -> Option<&PartitionSet> {
        self.partitions.as_ref()
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn is_numeric(&self) -> bool {
        self.data_type == DataType::Numeric
    }

    pub fn has_org_unit_dimension(&self) -> bool {
        !self.organisation_units.is_empty()
    }

    pub fn has_org_unit_filter(&self) -> bool {
        !self.org_unit_filters.is_empty()
    }

    pub fn has_enrollment_org_unit_filter(&self) -> bool {
        !self.enrollment_org_units.is_empty()
    }

    pub fn has_any_org_unit_constraint(&self) -> bool {
        self.has_org_unit_dimension()
            || self.has_org_unit_filter()
            || self.has_enrollment_org_unit_filter()
    }

    /// The single granularity shared by all periods; the period column is
    /// named after it.
    pub fn uniform_period_type(&self) -> Result<Option<PeriodType>> {
        let types: BTreeSet<PeriodType> = self.periods.iter().map(|p| p.period_type).collect();
        match types.len() {
            0 => Ok(None),
            1 => Ok(types.into_iter().next()),
            _ => Err(AnalyticsError::IllegalQuery(format!(
                "periods mix granularities {types:?}; query one period type at a time"
            ))),
        }
    }

    /// Period with the latest end date.
    pub fn latest_period(&self) -> Option<&Period> {
        self.periods.iter().max_by_key(|p| (p.end_date, p.start_date))
    }

    pub fn earliest_start_date(&self) -> Option<NaiveDate> {
        self.periods
            .iter()
            .map(|p| p.start_date)
            .chain(self.start_date)
            .min()
    }

    pub fn latest_end_date(&self) -> Option<NaiveDate> {
        self.periods
            .iter()
            .map(|p| p.end_date)
            .chain(self.end_date)
            .max()
    }

    /// Date window scanned for FIRST/LAST values: the lookback span ending at
    /// the latest requested date. `None` for other aggregations.
    pub fn first_or_last_window(&self) -> Option<(NaiveDate, NaiveDate)> {
        if !self.aggregation.is_first_or_last() {
            return None;
        }
        let latest = self.latest_end_date()?;
        let earliest = latest
            .checked_sub_months(Months::new(FIRST_LAST_LOOKBACK_YEARS * 12))?
            .succ_opt()?;
        Some((earliest, latest))
    }
}

/// Builder for [`DimensionalQuery`]; `build` validates before handing out
/// the immutable value.
#[derive(Debug, Clone)]
pub struct DimensionalQueryBuilder {
    query: DimensionalQuery,
}

impl DimensionalQueryBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            query: DimensionalQuery {
                table_name: table_name.into(),
                periods: Vec::new(),
                organisation_units: BTreeSet::new(),
                org_unit_mode: OrgUnitMode::default(),
                enrollment_org_units: BTreeSet::new(),
                org_unit_filters: BTreeSet::new(),
                data_items: Vec::new(),
                dimensions: Vec::new(),
                filters: BTreeMap::new(),
                measure_criteria: MeasureCriteria::new(),
                pre_aggregate_measure_criteria: MeasureCriteria::new(),
                aggregation: Aggregation::default(),
                data_type: DataType::default(),
                value_column: DEFAULT_VALUE_COLUMN.to_string(),
                partitions: None,
                start_date: None,
                end_date: None,
            },
        }
    }

    pub fn period(mut self, period: Period) -> Self {
        if !self.query.periods.contains(&period) {
            self.query.periods.push(period);
        }
        self
    }

    pub fn periods(mut self, periods: impl IntoIterator<Item = Period>) -> Self {
        self.query.periods.clear();
        for period in periods {
            self = self.period(period);
        }
        self
    }

    pub fn organisation_unit(mut self, unit: OrgUnitRef) -> Self {
        self.query.organisation_units.insert(unit);
        self
    }

    /// Replace the organisation-unit dimension.
    pub fn organisation_units(mut self, units: impl IntoIterator<Item = OrgUnitRef>) -> Self {
        self.query.organisation_units = units.into_iter().collect();
        self
    }

    pub fn org_unit_mode(mut self, mode: OrgUnitMode) -> Self {
        self.query.org_unit_mode = mode;
        self
    }

    pub fn enrollment_org_units(mut self, units: impl IntoIterator<Item = OrgUnitRef>) -> Self {
        self.query.enrollment_org_units = units.into_iter().collect();
        self
    }

    pub fn org_unit_filter(mut self, unit: OrgUnitRef) -> Self {
        self.query.org_unit_filters.insert(unit);
        self
    }

    /// Replace the organisation-unit filter.
    pub fn org_unit_filters(mut self, units: impl IntoIterator<Item = OrgUnitRef>) -> Self {
        self.query.org_unit_filters = units.into_iter().collect();
        self
    }

    pub fn data_item(mut self, item: DataItemRef) -> Self {
        if !self.query.data_items.contains(&item) {
            self.query.data_items.push(item);
        }
        self
    }

    pub fn data_items(mut self, items: impl IntoIterator<Item = DataItemRef>) -> Self {
        self.query.data_items.clear();
        for item in items {
            self = self.data_item(item);
        }
        self
    }

    /// Add an output dimension, replacing the items of one already present.
    pub fn dimension<I, S>(mut self, id: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        let items: BTreeSet<ItemId> = items.into_iter().map(Into::into).collect();
        match self.query.dimensions.iter_mut().find(|d| d.id == id) {
            Some(existing) => existing.items = items,
            None => self.query.dimensions.push(DimensionItems { id, items }),
        }
        self
    }

    /// Set the items of a filter dimension, replacing any previous items.
    pub fn filter<I, S>(mut self, id: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query
            .filters
            .insert(id.into(), items.into_iter().map(Into::into).collect());
        self
    }

    pub fn measure_criteria(mut self, criteria: MeasureCriteria) -> Self {
        self.query.measure_criteria = criteria;
        self
    }

    pub fn pre_aggregate_measure_criteria(mut self, criteria: MeasureCriteria) -> Self {
        self.query.pre_aggregate_measure_criteria = criteria;
        self
    }

    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.query.aggregation = aggregation;
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.query.data_type = data_type;
        self
    }

    pub fn value_column(mut self, column: impl Into<String>) -> Self {
        self.query.value_column = column.into();
        self
    }

    pub fn partitions(mut self, partitions: PartitionSet) -> Self {
        self.query.partitions = Some(partitions);
        self
    }

    pub fn start_date(mut self, date: NaiveDate) -> Self {
        self.query.start_date = Some(date);
        self
    }

    pub fn end_date(mut self, date: NaiveDate) -> Self {
        self.query.end_date = Some(date);
        self
    }

    pub fn build(self) -> Result<DimensionalQuery> {
        let query = self.query;

        check_identifier("table name", &query.table_name)?;
        check_identifier("value column", &query.value_column)?;

        for dim in &query.dimensions {
            check_identifier("dimension", &dim.id)?;
            if RESERVED_DIMENSION_IDS.contains(&dim.id.as_str()) {
                return Err(AnalyticsError::IllegalQuery(format!(
                    "dimension `{}` has a dedicated query field",
                    dim.id
                )));
            }
        }
        for id in query.filters.keys() {
            check_identifier("filter dimension", id)?;
            if RESERVED_DIMENSION_IDS.contains(&id.as_str()) {
                return Err(AnalyticsError::IllegalQuery(format!(
                    "filter `{id}` has a dedicated query field"
                )));
            }
            if query.dimension(id).is_some() {
                return Err(AnalyticsError::IllegalQuery(format!(
                    "dimension `{id}` cannot be both an output dimension and a filter"
                )));
            }
        }

        for (filter, threshold) in query
            .measure_criteria
            .iter()
            .chain(query.pre_aggregate_measure_criteria.iter())
        {
            if !threshold.is_finite() {
                return Err(AnalyticsError::IllegalQuery(format!(
                    "measure criterion {filter}:{threshold} is not finite"
                )));
            }
        }

        Ok(query)
    }
}

/// Wire form of a query, as received from the request layer. Organisation
/// units are referenced by uid only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub table: String,
    pub periods: Vec<String>,
    pub organisation_units: Vec<String>,
    pub org_unit_mode: OrgUnitMode,
    pub enrollment_org_units: Vec<String>,
    pub org_unit_filters: Vec<String>,
    pub data_items: Vec<String>,
    pub dimensions: BTreeMap<DimensionId, Vec<ItemId>>,
    pub filters: BTreeMap<DimensionId, Vec<ItemId>>,
    pub measure_criteria: Option<String>,
    pub pre_aggregate_measure_criteria: Option<String>,
    pub aggregation: Aggregation,
    pub data_type: DataType,
    pub value_column: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}
