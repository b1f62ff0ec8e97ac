//! Set-oriented carrier resolution.
//!
//! The batch is written into a per-call temporary table and resolved
//! with one join, so a hundred-thousand-number batch costs one round
//! trip plus the insert. `ON COMMIT DROP` inside a dedicated
//! transaction keeps concurrent calls on the same pool isolated.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::postgres::PgPool;
use sqlx::Connection;

use abr_common::{error::is_connection_error, AbrError, Result};

use crate::dates::parse_reference_date;
use crate::numbers::{parse_batch, NumberKey};

/// Column names of the result set, in output order.
pub const RESULT_COLUMNS: [&str; 4] = [
    "terminal_number",
    "carrier_name",
    "ind_portado",
    "ind_designado",
];

/// Resolution verdict for one terminal number.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ResolvedNumber {
    pub terminal_number: i64,
    /// Serving carrier, or the unidentified sentinel name when neither
    /// registry knows the number.
    pub carrier_name: Option<String>,
    /// 1 when a portability event at or before the reference date decided
    /// the carrier.
    pub ind_portado: i16,
    /// 1 when the number falls inside a numbering-plan designation range.
    pub ind_designado: i16,
}

/// Result of one resolution call.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub reference_date: NaiveDate,
    pub numbers: Vec<ResolvedNumber>,
}

const CREATE_KEYS_TABLE: &str = "
    CREATE TEMP TABLE query_keys (
        terminal_number BIGINT PRIMARY KEY,
        cn              SMALLINT NOT NULL,
        prefix          INTEGER NOT NULL
    ) ON COMMIT DROP";

const INSERT_KEYS: &str = "
    INSERT INTO query_keys (terminal_number, cn, prefix)
    SELECT * FROM UNNEST($1::BIGINT[], $2::INT2[], $3::INT4[])";

/// Portability wins over designation; the -1 fallback maps unmatched
/// numbers onto the unidentified carrier row.
const RESOLVE_QUERY: &str = "
    SELECT q.terminal_number,
           c.carrier_name,
           (CASE WHEN p.receiving_carrier IS NOT NULL THEN 1 ELSE 0 END)::INT2 AS ind_portado,
           (CASE WHEN n.carrier_code IS NOT NULL THEN 1 ELSE 0 END)::INT2 AS ind_designado
    FROM query_keys q
    LEFT JOIN LATERAL (
        SELECT np.carrier_code
        FROM telecom.numbering_plan np
        WHERE np.cn = q.cn
          AND np.prefix = q.prefix
          AND q.terminal_number BETWEEN np.range_start AND np.range_end
        LIMIT 1
    ) n ON TRUE
    LEFT JOIN LATERAL (
        SELECT ph.receiving_carrier
        FROM telecom.portability_history ph
        WHERE ph.cn = q.cn
          AND ph.terminal_number = q.terminal_number
          AND ph.scheduled_date <= $1
        ORDER BY ph.scheduled_date DESC
        LIMIT 1
    ) p ON TRUE
    LEFT JOIN telecom.carriers c
        ON c.carrier_code = COALESCE(p.receiving_carrier, n.carrier_code, -1)
    ORDER BY q.terminal_number";

fn query_err(err: sqlx::Error) -> AbrError {
    if is_connection_error(&err) {
        AbrError::Connection(err)
    } else {
        AbrError::Schema {
            operation: "carrier resolution".to_string(),
            source: err,
        }
    }
}

/// Resolve the serving carrier for each number in `numbers` as of
/// `reference_date` (`None` means today).
///
/// The whole batch is validated before touching the database; a single
/// malformed entry or unparseable date fails the call with no partial
/// results.
pub async fn resolve_carriers<S: AsRef<str>>(
    pool: &PgPool,
    numbers: &[S],
    reference_date: Option<&str>,
) -> Result<Resolution> {
    let reference_date = parse_reference_date(reference_date)?;
    let keys = parse_batch(numbers)?;
    tracing::debug!(
        batch = keys.len(),
        %reference_date,
        "resolving carrier batch"
    );

    let mut conn = pool.acquire().await.map_err(AbrError::Connection)?;
    let mut tx = conn.begin().await.map_err(AbrError::Connection)?;

    sqlx::query(CREATE_KEYS_TABLE)
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

    let (terminal_numbers, cns, prefixes) = columns(&keys);
    sqlx::query(INSERT_KEYS)
        .bind(&terminal_numbers)
        .bind(&cns)
        .bind(&prefixes)
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

    let resolved: Vec<ResolvedNumber> = sqlx::query_as(RESOLVE_QUERY)
        .bind(reference_date)
        .fetch_all(&mut *tx)
        .await
        .map_err(query_err)?;

    tx.commit().await.map_err(query_err)?;

    tracing::info!(
        batch = terminal_numbers.len(),
        resolved = resolved.len(),
        %reference_date,
        "carrier batch resolved"
    );
    Ok(Resolution {
        reference_date,
        numbers: resolved,
    })
}

fn columns(keys: &[NumberKey]) -> (Vec<i64>, Vec<i16>, Vec<i32>) {
    let mut terminal_numbers = Vec::with_capacity(keys.len());
    let mut cns = Vec::with_capacity(keys.len());
    let mut prefixes = Vec::with_capacity(keys.len());
    for key in keys {
        terminal_numbers.push(key.terminal_number);
        cns.push(key.cn);
        prefixes.push(key.prefix);
    }
    (terminal_numbers, cns, prefixes)
}
