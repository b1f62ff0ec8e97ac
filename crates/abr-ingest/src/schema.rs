//! Schema management: staging and target DDL, COPY statements.
//!
//! Two schemas: `staging` holds raw per-file loads and is truncated
//! per run; `telecom` holds the promoted, queryable tables. All DDL is
//! idempotent (`IF NOT EXISTS`) so ensure-functions can run on every
//! ingestion.
//!
//! `telecom.portability_history` is LIST-partitioned by the national
//! code so the per-`cn` lookups done during carrier resolution only
//! touch one partition.

use sqlx::postgres::PgConnection;

use abr_common::{AbrError, Result};

use crate::kind::{NumberingKind, RecordFamily, RecordKind};

pub const STAGING_SCHEMA: &str = "staging";

// ============================================================================
// Staging DDL
// ============================================================================

const CREATE_PORTABILITY_RAW: &str = "
CREATE TABLE IF NOT EXISTS staging.portability_raw (
    record_type       SMALLINT,
    ticket_number     BIGINT,
    terminal_number   BIGINT,
    receiving_carrier INTEGER,
    receiving_name    VARCHAR(255),
    donor_carrier     INTEGER,
    donor_name        VARCHAR(255),
    scheduled_at      TIMESTAMP,
    status_code       INTEGER,
    status            VARCHAR(100),
    port_back_flag    SMALLINT,
    source_file       VARCHAR(255),
    created_at        TIMESTAMP NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_portability_raw_terminal
    ON staging.portability_raw (terminal_number);
CREATE INDEX IF NOT EXISTS idx_portability_raw_scheduled
    ON staging.portability_raw (scheduled_at);
";

const CREATE_NUMBERING_RAW: &str = "
CREATE TABLE IF NOT EXISTS staging.numbering_raw (
    carrier_name       VARCHAR(255),
    carrier_cnpj       VARCHAR(20),
    uf                 VARCHAR(2),
    cn                 SMALLINT,
    prefix             INTEGER,
    range_start        BIGINT,
    range_end          BIGINT,
    cnl_code           VARCHAR(10),
    locality           VARCHAR(255),
    local_area         VARCHAR(255),
    local_area_acronym VARCHAR(10),
    local_area_code    INTEGER,
    status             VARCHAR(100),
    service            VARCHAR(16),
    source_file        VARCHAR(255),
    created_at         TIMESTAMP NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_numbering_raw_cn_prefix
    ON staging.numbering_raw (cn, prefix);
";

const CREATE_CNG_RAW: &str = "
CREATE TABLE IF NOT EXISTS staging.cng_raw (
    carrier_name VARCHAR(255),
    carrier_cnpj VARCHAR(20),
    code         BIGINT,
    status       VARCHAR(100),
    source_file  VARCHAR(255),
    created_at   TIMESTAMP NOT NULL DEFAULT now()
);
";

const CREATE_SUP_RAW: &str = "
CREATE TABLE IF NOT EXISTS staging.sup_raw (
    carrier_name      VARCHAR(255),
    carrier_cnpj      VARCHAR(20),
    sup_number        BIGINT,
    extension         INTEGER,
    uf                VARCHAR(2),
    cn                SMALLINT,
    municipality_code INTEGER,
    municipality      VARCHAR(255),
    institution       VARCHAR(255),
    category          VARCHAR(255),
    status            VARCHAR(100),
    source_file       VARCHAR(255),
    created_at        TIMESTAMP NOT NULL DEFAULT now()
);
";

// ============================================================================
// Target DDL
// ============================================================================

const CREATE_CARRIERS: &str = "
CREATE TABLE IF NOT EXISTS telecom.carriers (
    carrier_code BIGINT PRIMARY KEY,
    carrier_name VARCHAR(255) NOT NULL
);
INSERT INTO telecom.carriers (carrier_code, carrier_name)
VALUES (-1, 'NAO IDENTIFICADO')
ON CONFLICT (carrier_code) DO NOTHING;
";

const CREATE_NUMBERING_PLAN: &str = "
CREATE TABLE IF NOT EXISTS telecom.numbering_plan (
    cn           SMALLINT NOT NULL,
    prefix       INTEGER NOT NULL,
    range_start  BIGINT NOT NULL,
    range_end    BIGINT NOT NULL,
    carrier_code BIGINT NOT NULL DEFAULT -1,
    service      VARCHAR(16),
    uf           VARCHAR(2),
    status       VARCHAR(100),
    source_file  VARCHAR(255),
    PRIMARY KEY (cn, prefix, range_start)
);
CREATE INDEX IF NOT EXISTS idx_numbering_plan_cn_prefix
    ON telecom.numbering_plan (cn, prefix);
";

const CREATE_PORTABILITY_HISTORY: &str = "
CREATE TABLE IF NOT EXISTS telecom.portability_history (
    cn                SMALLINT NOT NULL,
    terminal_number   BIGINT NOT NULL,
    scheduled_date    DATE NOT NULL,
    scheduled_at      TIMESTAMP NOT NULL,
    ticket_number     BIGINT,
    receiving_carrier BIGINT NOT NULL DEFAULT -1,
    donor_carrier     BIGINT NOT NULL DEFAULT -1,
    port_back_flag    SMALLINT NOT NULL DEFAULT 0,
    status            VARCHAR(100),
    source_file       VARCHAR(255),
    PRIMARY KEY (cn, terminal_number, scheduled_date)
) PARTITION BY LIST (cn);

CREATE TABLE IF NOT EXISTS telecom.portability_history_cn_11
    PARTITION OF telecom.portability_history FOR VALUES IN (11);
CREATE TABLE IF NOT EXISTS telecom.portability_history_cn_12_28
    PARTITION OF telecom.portability_history
    FOR VALUES IN (12, 13, 14, 15, 16, 17, 18, 19, 21, 22, 24, 27, 28);
CREATE TABLE IF NOT EXISTS telecom.portability_history_cn_30_55
    PARTITION OF telecom.portability_history
    FOR VALUES IN (31, 32, 33, 34, 35, 37, 38, 41, 42, 43, 44, 45, 46, 47, 48, 49, 51, 53, 54, 55);
CREATE TABLE IF NOT EXISTS telecom.portability_history_cn_61_99
    PARTITION OF telecom.portability_history
    FOR VALUES IN (61, 62, 63, 64, 65, 66, 67, 68, 69, 71, 73, 74, 75, 77, 79,
                   81, 82, 83, 84, 85, 86, 87, 88, 89, 91, 92, 93, 94, 95, 96, 97, 98, 99);
CREATE TABLE IF NOT EXISTS telecom.portability_history_default
    PARTITION OF telecom.portability_history DEFAULT;
";

const CREATE_PORTABILITY_HISTORY_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_portability_history_lookup
    ON telecom.portability_history (terminal_number, scheduled_date DESC);
CREATE INDEX IF NOT EXISTS idx_portability_history_scheduled
    ON telecom.portability_history (scheduled_date);
CREATE INDEX IF NOT EXISTS idx_portability_history_receiving
    ON telecom.portability_history (receiving_carrier);
";

const CREATE_CNG_CODES: &str = "
CREATE TABLE IF NOT EXISTS telecom.cng_codes (
    code         BIGINT PRIMARY KEY,
    carrier_code BIGINT NOT NULL DEFAULT -1,
    status       VARCHAR(100),
    source_file  VARCHAR(255)
);
";

const CREATE_SUP_NUMBERS: &str = "
CREATE TABLE IF NOT EXISTS telecom.sup_numbers (
    sup_number        BIGINT NOT NULL,
    cn                SMALLINT NOT NULL DEFAULT -1,
    municipality_code INTEGER NOT NULL DEFAULT -1,
    carrier_code      BIGINT NOT NULL DEFAULT -1,
    uf                VARCHAR(2),
    municipality      VARCHAR(255),
    institution       VARCHAR(255),
    category          VARCHAR(255),
    status            VARCHAR(100),
    source_file       VARCHAR(255),
    PRIMARY KEY (sup_number, cn, municipality_code)
);
";

const DROP_TARGET_TABLES: &str = "
DROP TABLE IF EXISTS telecom.portability_history CASCADE;
DROP TABLE IF EXISTS telecom.numbering_plan CASCADE;
DROP TABLE IF EXISTS telecom.cng_codes CASCADE;
DROP TABLE IF EXISTS telecom.sup_numbers CASCADE;
DROP TABLE IF EXISTS telecom.carriers CASCADE;
";

const DROP_TARGET_INDEXES: &str = "
DROP INDEX IF EXISTS telecom.idx_numbering_plan_cn_prefix;
DROP INDEX IF EXISTS telecom.idx_portability_history_lookup;
DROP INDEX IF EXISTS telecom.idx_portability_history_scheduled;
DROP INDEX IF EXISTS telecom.idx_portability_history_receiving;
";

// ============================================================================
// COPY statements (column order must match models::StagingRow encoders)
// ============================================================================

pub const COPY_PORTABILITY: &str = "COPY staging.portability_raw \
    (record_type, ticket_number, terminal_number, receiving_carrier, receiving_name, \
     donor_carrier, donor_name, scheduled_at, status_code, status, port_back_flag, source_file) \
    FROM STDIN WITH (FORMAT csv, DELIMITER E'\\t', NULL '\\N')";

pub const COPY_NUMBERING: &str = "COPY staging.numbering_raw \
    (carrier_name, carrier_cnpj, uf, cn, prefix, range_start, range_end, cnl_code, locality, \
     local_area, local_area_acronym, local_area_code, status, service, source_file) \
    FROM STDIN WITH (FORMAT csv, DELIMITER E'\\t', NULL '\\N')";

pub const COPY_CNG: &str = "COPY staging.cng_raw \
    (carrier_name, carrier_cnpj, code, status, source_file) \
    FROM STDIN WITH (FORMAT csv, DELIMITER E'\\t', NULL '\\N')";

pub const COPY_SUP: &str = "COPY staging.sup_raw \
    (carrier_name, carrier_cnpj, sup_number, extension, uf, cn, municipality_code, \
     municipality, institution, category, status, source_file) \
    FROM STDIN WITH (FORMAT csv, DELIMITER E'\\t', NULL '\\N')";

/// Staging table name for a classified record kind.
pub fn staging_table(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Portability => "portability_raw",
        RecordKind::Numbering(NumberingKind::Cng) => "cng_raw",
        RecordKind::Numbering(NumberingKind::Sup) => "sup_raw",
        RecordKind::Numbering(_) => "numbering_raw",
    }
}

/// COPY statement for a classified record kind.
pub fn copy_statement(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Portability => COPY_PORTABILITY,
        RecordKind::Numbering(NumberingKind::Cng) => COPY_CNG,
        RecordKind::Numbering(NumberingKind::Sup) => COPY_SUP,
        RecordKind::Numbering(_) => COPY_NUMBERING,
    }
}

async fn run_ddl(conn: &mut PgConnection, operation: &str, sql: &str) -> Result<()> {
    sqlx::raw_sql(sql)
        .execute(&mut *conn)
        .await
        .map_err(|source| AbrError::Schema {
            operation: operation.to_string(),
            source,
        })?;
    tracing::debug!(operation, "schema operation applied");
    Ok(())
}

/// Create the `staging` and `telecom` schemas if absent.
pub async fn ensure_schemas(conn: &mut PgConnection) -> Result<()> {
    run_ddl(
        conn,
        "create schemas",
        "CREATE SCHEMA IF NOT EXISTS staging; CREATE SCHEMA IF NOT EXISTS telecom;",
    )
    .await
}

/// Create every staging table if absent.
pub async fn ensure_staging_tables(conn: &mut PgConnection) -> Result<()> {
    run_ddl(conn, "create staging.portability_raw", CREATE_PORTABILITY_RAW).await?;
    run_ddl(conn, "create staging.numbering_raw", CREATE_NUMBERING_RAW).await?;
    run_ddl(conn, "create staging.cng_raw", CREATE_CNG_RAW).await?;
    run_ddl(conn, "create staging.sup_raw", CREATE_SUP_RAW).await?;
    Ok(())
}

/// Create target tables (with partitions, indexes and the unidentified
/// carrier sentinel) if absent.
pub async fn ensure_target_tables(conn: &mut PgConnection) -> Result<()> {
    run_ddl(conn, "create telecom.carriers", CREATE_CARRIERS).await?;
    run_ddl(conn, "create telecom.numbering_plan", CREATE_NUMBERING_PLAN).await?;
    run_ddl(
        conn,
        "create telecom.portability_history",
        CREATE_PORTABILITY_HISTORY,
    )
    .await?;
    run_ddl(
        conn,
        "index telecom.portability_history",
        CREATE_PORTABILITY_HISTORY_INDEXES,
    )
    .await?;
    run_ddl(conn, "create telecom.cng_codes", CREATE_CNG_CODES).await?;
    run_ddl(conn, "create telecom.sup_numbers", CREATE_SUP_NUMBERS).await?;
    Ok(())
}

/// Empty the staging table backing `kind` ahead of a load run.
pub async fn truncate_staging(conn: &mut PgConnection, kind: RecordKind) -> Result<()> {
    let table = staging_table(kind);
    let sql = format!("TRUNCATE TABLE {STAGING_SCHEMA}.{table}");
    run_ddl(conn, &format!("truncate {STAGING_SCHEMA}.{table}"), &sql).await
}

/// Empty the target tables a family promotes into, for truncate-mode
/// runs where the new exports fully replace the promoted data.
pub async fn truncate_target_tables(conn: &mut PgConnection, family: RecordFamily) -> Result<()> {
    let sql = match family {
        RecordFamily::Portability => "TRUNCATE TABLE telecom.portability_history",
        RecordFamily::NumberingPlan => {
            "TRUNCATE TABLE telecom.numbering_plan, telecom.cng_codes, telecom.sup_numbers"
        }
    };
    run_ddl(conn, "truncate target tables", sql).await
}

/// Drop and recreate every target table. Destroys promoted data.
pub async fn rebuild_target_tables(conn: &mut PgConnection) -> Result<()> {
    tracing::warn!("rebuilding target tables, all promoted data will be dropped");
    run_ddl(conn, "drop target tables", DROP_TARGET_TABLES).await?;
    ensure_target_tables(conn).await
}

/// Drop and recreate target indexes. Useful after a large append run.
pub async fn rebuild_indexes(conn: &mut PgConnection) -> Result<()> {
    run_ddl(conn, "drop target indexes", DROP_TARGET_INDEXES).await?;
    run_ddl(
        conn,
        "recreate numbering index",
        "CREATE INDEX IF NOT EXISTS idx_numbering_plan_cn_prefix \
         ON telecom.numbering_plan (cn, prefix);",
    )
    .await?;
    run_ddl(
        conn,
        "recreate portability indexes",
        CREATE_PORTABILITY_HISTORY_INDEXES,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_table_routing() {
        assert_eq!(staging_table(RecordKind::Portability), "portability_raw");
        assert_eq!(
            staging_table(RecordKind::Numbering(NumberingKind::Stfc)),
            "numbering_raw"
        );
        assert_eq!(
            staging_table(RecordKind::Numbering(NumberingKind::Smp)),
            "numbering_raw"
        );
        assert_eq!(
            staging_table(RecordKind::Numbering(NumberingKind::Cng)),
            "cng_raw"
        );
        assert_eq!(
            staging_table(RecordKind::Numbering(NumberingKind::Sup)),
            "sup_raw"
        );
    }

    #[test]
    fn test_copy_statement_column_count_matches_encoders() {
        // Each COPY column list must line up with the corresponding
        // write_copy_row field order in models.rs.
        let count = |stmt: &str| {
            let open = stmt.find('(').unwrap();
            let close = stmt.find(')').unwrap();
            stmt[open + 1..close].split(',').count()
        };
        assert_eq!(count(COPY_PORTABILITY), 12);
        assert_eq!(count(COPY_NUMBERING), 15);
        assert_eq!(count(COPY_CNG), 5);
        assert_eq!(count(COPY_SUP), 12);
    }

    #[test]
    fn test_copy_statements_address_staging() {
        for stmt in [COPY_PORTABILITY, COPY_NUMBERING, COPY_CNG, COPY_SUP] {
            assert!(stmt.starts_with("COPY staging."));
            assert!(stmt.contains("NULL '\\N'"));
        }
    }
}
