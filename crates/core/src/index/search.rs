//! Keyset-paginated torrent search.
//!
//! A page is fetched by ordering on `(sort column, id)` and, for continuation pages,
//! keeping only rows strictly past the last row of the previous page. Ties on the sort
//! column are broken by `id`, so a walk visits every matching row exactly once.
//!
//! The SQL text is assembled from a closed set of fragments chosen by [`SearchPlan`];
//! every caller-supplied value is a bound parameter.

use super::reader::{torrent_from_row, N_FILES_SUBQUERY};
use super::{IndexError, IndexHandle, OrderingCriteria, TorrentMetadata};

/// Parameters for one page of search results.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentQuery {
    /// Case-insensitive substring to look for in names. Empty matches everything.
    pub query: String,
    /// Unix seconds; torrents discovered after the end of this second are excluded.
    pub epoch: i64,
    pub order_by: OrderingCriteria,
    pub ascending: bool,
    pub limit: u32,
    /// Sort value of the previous page's last row.
    pub last_ordered_value: Option<f64>,
    /// Id of the previous page's last row.
    pub last_id: Option<i64>,
}

impl TorrentQuery {
    /// First page of everything discovered up to `epoch`, newest first.
    pub fn new(epoch: i64) -> Self {
        Self {
            query: String::new(),
            epoch,
            order_by: OrderingCriteria::ByDiscoveredOn,
            ascending: false,
            limit: 20,
            last_ordered_value: None,
            last_id: None,
        }
    }

    pub fn text(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn order_by(mut self, order_by: OrderingCriteria, ascending: bool) -> Self {
        self.order_by = order_by;
        self.ascending = ascending;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Continue after the row with the given sort value and id.
    pub fn after(mut self, last_ordered_value: f64, last_id: i64) -> Self {
        self.last_ordered_value = Some(last_ordered_value);
        self.last_id = Some(last_id);
        self
    }

    /// The query for the page following `last`, which must be the final row of the
    /// current page.
    pub fn next_page(&self, last: &TorrentMetadata) -> Option<Self> {
        let value = last.ordered_value(self.order_by)?;
        Some(self.clone().after(value, last.id))
    }

    /// Rejects combinations that cannot be answered, before anything is executed.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.order_by == OrderingCriteria::ByRelevance && self.query.is_empty() {
            return Err(IndexError::Query(
                "cannot order by relevance without a query".to_string(),
            ));
        }

        match (self.last_ordered_value, self.last_id) {
            (Some(value), Some(_)) if !value.is_finite() => Err(IndexError::Query(format!(
                "last_ordered_value must be a finite number, got {}",
                value
            ))),
            (Some(_), Some(_)) | (None, None) => Ok(()),
            _ => Err(IndexError::Query(
                "last_ordered_value and last_id must be given together".to_string(),
            )),
        }
    }
}

/// Which clause variants a query needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPlan {
    pub text_filter: bool,
    pub continuation: bool,
    pub order_by: OrderingCriteria,
    pub ascending: bool,
}

impl SearchPlan {
    pub fn for_query(query: &TorrentQuery) -> Self {
        Self {
            text_filter: !query.query.is_empty(),
            continuation: query.last_ordered_value.is_some() && query.last_id.is_some(),
            order_by: query.order_by,
            ascending: query.ascending,
        }
    }

    /// Placeholders: `$1` epoch, then the raw text and its ILIKE pattern (text filter
    /// only), then the cursor value and id (continuation only), then the limit.
    pub fn sql(&self) -> String {
        let mut next_param = 2;
        let mut param = || {
            let p = format!("${}", next_param);
            next_param += 1;
            p
        };

        let (relevance, name_filter) = if self.text_filter {
            let raw = param();
            let pattern = param();
            (
                format!("similarity(t.name, {raw})::DOUBLE PRECISION"),
                format!(" AND t.name ILIKE {pattern}"),
            )
        } else {
            ("NULL::DOUBLE PRECISION".to_string(), String::new())
        };

        let column = sort_column(self.order_by);
        let direction = if self.ascending { "ASC" } else { "DESC" };

        let keyset = if self.continuation {
            let value = cursor_expr(self.order_by, &param());
            let id = param();
            let operator = if self.ascending { ">" } else { "<" };
            format!(" WHERE ({column}, id) {operator} ({value}, {id})")
        } else {
            String::new()
        };

        let limit = param();

        format!(
            "SELECT * FROM (
                SELECT t.id::BIGINT AS id, t.info_hash, t.name, t.total_size, t.discovered_on,
                       {N_FILES_SUBQUERY} AS n_files,
                       {relevance} AS relevance
                FROM torrents t
                WHERE t.discovered_on < to_timestamp($1::DOUBLE PRECISION + 1){name_filter}
            ) AS matched{keyset}
            ORDER BY {column} {direction}, id {direction}
            LIMIT {limit}"
        )
    }
}

fn sort_column(order_by: OrderingCriteria) -> &'static str {
    match order_by {
        OrderingCriteria::ByRelevance => "relevance",
        OrderingCriteria::ByTotalSize => "total_size",
        OrderingCriteria::ByDiscoveredOn => "discovered_on",
        OrderingCriteria::ByNFiles => "n_files",
    }
}

/// Converts the bound `f64` cursor value into the sort column's own type.
fn cursor_expr(order_by: OrderingCriteria, placeholder: &str) -> String {
    match order_by {
        OrderingCriteria::ByRelevance => format!("{placeholder}::DOUBLE PRECISION"),
        OrderingCriteria::ByTotalSize | OrderingCriteria::ByNFiles => {
            format!("{placeholder}::DOUBLE PRECISION::BIGINT")
        }
        OrderingCriteria::ByDiscoveredOn => {
            format!("to_timestamp({placeholder}::DOUBLE PRECISION)")
        }
    }
}

/// Escapes LIKE metacharacters and wraps the text for substring matching.
pub fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub async fn query_torrents(
    handle: &IndexHandle,
    query: &TorrentQuery,
) -> Result<Vec<TorrentMetadata>, IndexError> {
    query.validate()?;

    if query.limit == 0 {
        return Ok(Vec::new());
    }

    let plan = SearchPlan::for_query(query);
    let sql = plan.sql();
    let pattern = like_pattern(&query.query);

    let mut statement = sqlx::query(&sql).bind(query.epoch as f64);
    if plan.text_filter {
        statement = statement.bind(query.query.as_str()).bind(pattern.as_str());
    }
    if let (true, Some(value), Some(id)) =
        (plan.continuation, query.last_ordered_value, query.last_id)
    {
        statement = statement.bind(value).bind(id);
    }
    statement = statement.bind(i64::from(query.limit));

    let rows = statement
        .fetch_all(handle.pool())
        .await
        .map_err(IndexError::database("query torrents"))?;

    rows.iter()
        .map(torrent_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(IndexError::database("decode torrent"))
}
