//! Promotion: set-based merges from staging into `telecom` tables.
//!
//! Each promotion is a single INSERT ... SELECT over the staging rows
//! of one source file, deduplicated with DISTINCT ON and merged with
//! ON CONFLICT so re-importing a file is idempotent.
//!
//! Numbering ranges are stored as full composed terminal numbers
//! (`cn || prefix || lpad(range, 4)`), so resolution compares the
//! queried number against the bounds directly.

use sqlx::postgres::PgConnection;

use abr_common::{AbrError, Result};

/// Extract a numeric carrier code from a CNPJ column, falling back to
/// the unidentified sentinel.
const CNPJ_TO_CODE: &str =
    "COALESCE(NULLIF(regexp_replace(carrier_cnpj, '\\D', '', 'g'), '')::BIGINT, -1)";

const PORTABILITY_MERGE: &str = "
    INSERT INTO telecom.portability_history
        (cn, terminal_number, scheduled_date, scheduled_at, ticket_number,
         receiving_carrier, donor_carrier, port_back_flag, status, source_file)
    SELECT DISTINCT ON (s.terminal_number, s.scheduled_at::date)
        CAST(SUBSTRING(s.terminal_number::text, 1, 2) AS SMALLINT),
        s.terminal_number,
        s.scheduled_at::date,
        s.scheduled_at,
        s.ticket_number,
        COALESCE(s.receiving_carrier, -1)::BIGINT,
        COALESCE(s.donor_carrier, -1)::BIGINT,
        COALESCE(s.port_back_flag, 0),
        s.status,
        s.source_file
    FROM staging.portability_raw s
    WHERE s.source_file = $1
    ORDER BY s.terminal_number, s.scheduled_at::date, s.scheduled_at DESC
    ON CONFLICT (cn, terminal_number, scheduled_date) DO UPDATE SET
        scheduled_at      = EXCLUDED.scheduled_at,
        ticket_number     = EXCLUDED.ticket_number,
        receiving_carrier = EXCLUDED.receiving_carrier,
        donor_carrier     = EXCLUDED.donor_carrier,
        port_back_flag    = EXCLUDED.port_back_flag,
        status            = EXCLUDED.status,
        source_file       = EXCLUDED.source_file";

const OVERLAP_CHECK: &str = "
    WITH candidate AS (
        SELECT DISTINCT
            cn, prefix,
            (cn::text || prefix::text || lpad(range_start::text, 4, '0'))::BIGINT AS range_start,
            (cn::text || prefix::text || lpad(range_end::text, 4, '0'))::BIGINT AS range_end
        FROM staging.numbering_raw
        WHERE source_file = $1
    ),
    pool AS (
        SELECT cn, prefix, range_start, range_end FROM candidate
        UNION ALL
        SELECT t.cn, t.prefix, t.range_start, t.range_end
        FROM telecom.numbering_plan t
        WHERE EXISTS (
                SELECT 1 FROM candidate c
                WHERE c.cn = t.cn AND c.prefix = t.prefix)
          AND NOT EXISTS (
                SELECT 1 FROM candidate c
                WHERE c.cn = t.cn AND c.prefix = t.prefix
                  AND c.range_start = t.range_start)
    ),
    ordered AS (
        SELECT range_start,
               lag(range_end) OVER (PARTITION BY cn, prefix ORDER BY range_start) AS prev_end
        FROM pool
    )
    SELECT COUNT(*) FROM ordered
    WHERE prev_end IS NOT NULL AND range_start <= prev_end";

fn numbering_merge_sql() -> String {
    format!(
        "
        INSERT INTO telecom.numbering_plan
            (cn, prefix, range_start, range_end, carrier_code, service, uf, status, source_file)
        SELECT DISTINCT ON (s.cn, s.prefix, s.range_start)
            s.cn,
            s.prefix,
            (s.cn::text || s.prefix::text || lpad(s.range_start::text, 4, '0'))::BIGINT,
            (s.cn::text || s.prefix::text || lpad(s.range_end::text, 4, '0'))::BIGINT,
            {CNPJ_TO_CODE},
            s.service,
            s.uf,
            s.status,
            s.source_file
        FROM staging.numbering_raw s
        WHERE s.source_file = $1
        ORDER BY s.cn, s.prefix, s.range_start
        ON CONFLICT (cn, prefix, range_start) DO UPDATE SET
            range_end    = EXCLUDED.range_end,
            carrier_code = EXCLUDED.carrier_code,
            service      = EXCLUDED.service,
            uf           = EXCLUDED.uf,
            status       = EXCLUDED.status,
            source_file  = EXCLUDED.source_file"
    )
}

fn cng_merge_sql() -> String {
    format!(
        "
        INSERT INTO telecom.cng_codes (code, carrier_code, status, source_file)
        SELECT DISTINCT ON (s.code)
            s.code, {CNPJ_TO_CODE}, s.status, s.source_file
        FROM staging.cng_raw s
        WHERE s.source_file = $1
        ORDER BY s.code
        ON CONFLICT (code) DO UPDATE SET
            carrier_code = EXCLUDED.carrier_code,
            status       = EXCLUDED.status,
            source_file  = EXCLUDED.source_file"
    )
}

fn sup_merge_sql() -> String {
    format!(
        "
        INSERT INTO telecom.sup_numbers
            (sup_number, cn, municipality_code, carrier_code, uf, municipality,
             institution, category, status, source_file)
        SELECT DISTINCT ON (s.sup_number, COALESCE(s.cn, -1), COALESCE(s.municipality_code, -1))
            s.sup_number,
            COALESCE(s.cn, -1),
            COALESCE(s.municipality_code, -1),
            {CNPJ_TO_CODE},
            s.uf,
            s.municipality,
            s.institution,
            s.category,
            s.status,
            s.source_file
        FROM staging.sup_raw s
        WHERE s.source_file = $1
        ORDER BY s.sup_number, COALESCE(s.cn, -1), COALESCE(s.municipality_code, -1)
        ON CONFLICT (sup_number, cn, municipality_code) DO UPDATE SET
            carrier_code = EXCLUDED.carrier_code,
            uf           = EXCLUDED.uf,
            municipality = EXCLUDED.municipality,
            institution  = EXCLUDED.institution,
            category     = EXCLUDED.category,
            status       = EXCLUDED.status,
            source_file  = EXCLUDED.source_file"
    )
}

const REFRESH_CARRIERS: &str = "
    INSERT INTO telecom.carriers (carrier_code, carrier_name)
    SELECT DISTINCT ON (seen.code) seen.code, seen.name
    FROM (
        SELECT receiving_carrier::BIGINT AS code, receiving_name AS name
        FROM staging.portability_raw
        WHERE receiving_carrier IS NOT NULL AND receiving_name IS NOT NULL
        UNION
        SELECT donor_carrier::BIGINT, donor_name
        FROM staging.portability_raw
        WHERE donor_carrier IS NOT NULL AND donor_name IS NOT NULL
        UNION
        SELECT NULLIF(regexp_replace(carrier_cnpj, '\\D', '', 'g'), '')::BIGINT, carrier_name
        FROM staging.numbering_raw
        WHERE carrier_cnpj IS NOT NULL AND carrier_name IS NOT NULL
    ) seen
    LEFT JOIN telecom.carriers known ON known.carrier_code = seen.code
    WHERE seen.code IS NOT NULL AND known.carrier_code IS NULL
    ORDER BY seen.code
    ON CONFLICT (carrier_code) DO NOTHING";

async fn run_merge(
    conn: &mut PgConnection,
    operation: String,
    sql: &str,
    source_file: &str,
) -> Result<u64> {
    let result = sqlx::query(sql)
        .bind(source_file)
        .execute(&mut *conn)
        .await
        .map_err(|source| AbrError::Schema { operation, source })?;
    Ok(result.rows_affected())
}

/// Merge one file's portability rows into `telecom.portability_history`.
///
/// When a terminal has several completed tickets on the same day only
/// the latest one counts, so rows are deduplicated on
/// `(terminal_number, scheduled_at::date)` keeping the newest event.
pub async fn promote_portability(conn: &mut PgConnection, source_file: &str) -> Result<u64> {
    let rows = run_merge(
        conn,
        format!("promote portability from '{source_file}'"),
        PORTABILITY_MERGE,
        source_file,
    )
    .await?;
    tracing::info!(source_file, rows, "promoted portability history");
    Ok(rows)
}

/// Reject a file whose ranges overlap existing or sibling designations.
///
/// Candidate ranges from the file are pooled with the already-promoted
/// ranges of the same `(cn, prefix)` (minus the rows the merge would
/// overwrite), then adjacent ranges are compared in range order. Any
/// start at or below the previous end is a conflict.
pub async fn check_range_overlap(conn: &mut PgConnection, source_file: &str) -> Result<()> {
    let count: i64 = sqlx::query_scalar(OVERLAP_CHECK)
        .bind(source_file)
        .fetch_one(&mut *conn)
        .await
        .map_err(|source| AbrError::Schema {
            operation: format!("range overlap check for '{source_file}'"),
            source,
        })?;

    if count > 0 {
        return Err(AbrError::RangeOverlap {
            file: source_file.to_string(),
            count,
        });
    }
    Ok(())
}

/// Merge one file's ranged designations into `telecom.numbering_plan`,
/// composing the full terminal-number bounds from cn, prefix and the
/// four-digit range columns.
pub async fn promote_numbering(conn: &mut PgConnection, source_file: &str) -> Result<u64> {
    let sql = numbering_merge_sql();
    let rows = run_merge(
        conn,
        format!("promote numbering plan from '{source_file}'"),
        &sql,
        source_file,
    )
    .await?;
    tracing::info!(source_file, rows, "promoted numbering plan");
    Ok(rows)
}

/// Merge one file's non-geographic codes into `telecom.cng_codes`.
pub async fn promote_cng(conn: &mut PgConnection, source_file: &str) -> Result<u64> {
    let sql = cng_merge_sql();
    let rows = run_merge(
        conn,
        format!("promote cng codes from '{source_file}'"),
        &sql,
        source_file,
    )
    .await?;
    tracing::info!(source_file, rows, "promoted cng codes");
    Ok(rows)
}

/// Merge one file's public-utility numbers into `telecom.sup_numbers`.
/// Absent cn and municipality columns take the -1 sentinel so the
/// composite key stays NOT NULL.
pub async fn promote_sup(conn: &mut PgConnection, source_file: &str) -> Result<u64> {
    let sql = sup_merge_sql();
    let rows = run_merge(
        conn,
        format!("promote sup numbers from '{source_file}'"),
        &sql,
        source_file,
    )
    .await?;
    tracing::info!(source_file, rows, "promoted sup numbers");
    Ok(rows)
}

/// Register carriers seen in staging that the registry does not know
/// yet. Existing names are kept: carrier codes are stable, names drift
/// across exports.
pub async fn refresh_carriers(conn: &mut PgConnection) -> Result<u64> {
    let result = sqlx::query(REFRESH_CARRIERS)
        .execute(&mut *conn)
        .await
        .map_err(|source| AbrError::Schema {
            operation: "refresh carrier registry".to_string(),
            source,
        })?;

    let rows = result.rows_affected();
    if rows > 0 {
        tracing::info!(new_carriers = rows, "registered carriers from staging");
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPOSED_START: &str = "(s.cn::text || s.prefix::text || lpad(s.range_start::text, 4, '0'))::BIGINT";
    const COMPOSED_END: &str = "(s.cn::text || s.prefix::text || lpad(s.range_end::text, 4, '0'))::BIGINT";

    #[test]
    fn test_portability_merge_dedups_and_upserts() {
        assert!(PORTABILITY_MERGE.contains("INSERT INTO telecom.portability_history"));
        assert!(PORTABILITY_MERGE
            .contains("SELECT DISTINCT ON (s.terminal_number, s.scheduled_at::date)"));
        // Latest same-day event wins.
        assert!(PORTABILITY_MERGE
            .contains("ORDER BY s.terminal_number, s.scheduled_at::date, s.scheduled_at DESC"));
        assert!(PORTABILITY_MERGE
            .contains("ON CONFLICT (cn, terminal_number, scheduled_date) DO UPDATE SET"));
        assert!(PORTABILITY_MERGE.contains("COALESCE(s.receiving_carrier, -1)::BIGINT"));
        assert!(PORTABILITY_MERGE.contains("COALESCE(s.donor_carrier, -1)::BIGINT"));
        assert!(PORTABILITY_MERGE.contains("WHERE s.source_file = $1"));
    }

    #[test]
    fn test_portability_merge_column_list() {
        assert!(PORTABILITY_MERGE.contains(
            "(cn, terminal_number, scheduled_date, scheduled_at, ticket_number,\n         receiving_carrier, donor_carrier, port_back_flag, status, source_file)"
        ));
    }

    #[test]
    fn test_overlap_check_composes_and_compares_adjacent_ranges() {
        assert!(OVERLAP_CHECK.contains(
            "(cn::text || prefix::text || lpad(range_start::text, 4, '0'))::BIGINT AS range_start"
        ));
        assert!(OVERLAP_CHECK.contains(
            "lag(range_end) OVER (PARTITION BY cn, prefix ORDER BY range_start) AS prev_end"
        ));
        assert!(OVERLAP_CHECK.contains("WHERE prev_end IS NOT NULL AND range_start <= prev_end"));
        // Target rows the merge would overwrite must not count as conflicts.
        assert!(OVERLAP_CHECK.contains("AND c.range_start = t.range_start"));
        assert!(OVERLAP_CHECK.contains("FROM telecom.numbering_plan t"));
    }

    #[test]
    fn test_numbering_merge_composed_bounds_and_conflict_key() {
        let sql = numbering_merge_sql();
        assert!(sql.contains("INSERT INTO telecom.numbering_plan"));
        assert!(sql.contains("SELECT DISTINCT ON (s.cn, s.prefix, s.range_start)"));
        assert!(sql.contains(COMPOSED_START));
        assert!(sql.contains(COMPOSED_END));
        assert!(sql.contains("ON CONFLICT (cn, prefix, range_start) DO UPDATE SET"));
        assert!(sql.contains(CNPJ_TO_CODE));
    }

    #[test]
    fn test_cng_merge_keys_on_code() {
        let sql = cng_merge_sql();
        assert!(sql.contains("INSERT INTO telecom.cng_codes (code, carrier_code, status, source_file)"));
        assert!(sql.contains("SELECT DISTINCT ON (s.code)"));
        assert!(sql.contains("ON CONFLICT (code) DO UPDATE SET"));
        assert!(sql.contains(CNPJ_TO_CODE));
    }

    #[test]
    fn test_sup_merge_uses_sentinel_composite_key() {
        let sql = sup_merge_sql();
        assert!(sql.contains(
            "SELECT DISTINCT ON (s.sup_number, COALESCE(s.cn, -1), COALESCE(s.municipality_code, -1))"
        ));
        assert!(sql.contains("ON CONFLICT (sup_number, cn, municipality_code) DO UPDATE SET"));
        assert!(sql.contains(CNPJ_TO_CODE));
    }

    #[test]
    fn test_refresh_carriers_is_insert_only() {
        assert!(REFRESH_CARRIERS.contains("INSERT INTO telecom.carriers (carrier_code, carrier_name)"));
        // Names drift across exports; known codes keep their first name.
        assert!(REFRESH_CARRIERS.contains("WHERE seen.code IS NOT NULL AND known.carrier_code IS NULL"));
        assert!(REFRESH_CARRIERS.contains("ON CONFLICT (carrier_code) DO NOTHING"));
        assert!(REFRESH_CARRIERS.contains("FROM staging.portability_raw"));
        assert!(REFRESH_CARRIERS.contains("FROM staging.numbering_raw"));
    }
}
