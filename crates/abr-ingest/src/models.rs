//! Staging row models and their COPY text encoding.
//!
//! Each source family decodes into a row struct that knows how to
//! append itself to a COPY buffer. The encoding matches the server-side
//! `COPY ... WITH (FORMAT csv, DELIMITER E'\t', NULL '\N')` statements
//! in [`crate::schema`]: tab-delimited, `\N` for NULL (unquoted), and
//! CSV quoting only when a field contains a delimiter, quote or
//! newline.

use chrono::NaiveDateTime;
use csv::StringRecord;

use crate::kind::NumberingKind;

/// A decoded row ready to be written into a staging table.
pub trait StagingRow {
    /// Append this row to a COPY buffer, terminated with a newline.
    fn write_copy_row(&self, buf: &mut String);
}

/// NULL marker understood by the COPY statements.
const COPY_NULL: &str = "\\N";

/// Append one field to a COPY CSV buffer, quoting only when needed.
fn push_field(buf: &mut String, value: &str) {
    if value.contains('\t') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        buf.push('"');
        for c in value.chars() {
            if c == '"' {
                buf.push('"');
            }
            buf.push(c);
        }
        buf.push('"');
    } else {
        buf.push_str(value);
    }
}

fn push_opt(buf: &mut String, value: Option<&str>) {
    match value {
        Some(v) => push_field(buf, v),
        None => buf.push_str(COPY_NULL),
    }
}

fn push_opt_display<T: std::fmt::Display>(buf: &mut String, value: Option<T>) {
    match value {
        Some(v) => buf.push_str(&v.to_string()),
        None => buf.push_str(COPY_NULL),
    }
}

/// Trim a field and map the empty string to None.
fn clean(field: Option<&str>) -> Option<String> {
    field
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse an optional integer field, treating empty and malformed
/// values as absent. Registry exports routinely leave numeric columns
/// blank.
fn parse_opt<T: std::str::FromStr>(field: Option<&str>) -> Option<T> {
    clean(field).and_then(|s| s.parse().ok())
}

/// Parse a required integer field.
fn parse_req<T: std::str::FromStr>(field: Option<&str>, column: &str) -> Result<T, String> {
    clean(field)
        .ok_or_else(|| format!("missing required column '{column}'"))?
        .parse()
        .map_err(|_| format!("invalid value in column '{column}'"))
}

/// One completed-portability record from a PIP report.
#[derive(Debug, Clone, PartialEq)]
pub struct PortabilityRow {
    pub record_type: i16,
    pub ticket_number: i64,
    pub terminal_number: i64,
    pub receiving_carrier: Option<i32>,
    pub receiving_name: Option<String>,
    pub donor_carrier: Option<i32>,
    pub donor_name: Option<String>,
    pub scheduled_at: NaiveDateTime,
    pub status_code: Option<i32>,
    pub status: Option<String>,
    pub port_back_flag: i16,
    pub source_file: String,
}

impl PortabilityRow {
    /// Column layout of a PIP completed-ticket report:
    /// `type;ticket;terminal;recv_code;recv_name;donor_code;donor_name;
    /// scheduled;status_code;status;port_back`
    pub fn from_record(record: &StringRecord, source_file: &str) -> Result<Self, String> {
        if record.len() < 11 {
            return Err(format!("expected 11 columns, found {}", record.len()));
        }

        let scheduled_raw = clean(record.get(7)).ok_or("missing required column 'scheduled'")?;
        let scheduled_at = NaiveDateTime::parse_from_str(&scheduled_raw, "%d/%m/%Y %H:%M:%S")
            .map_err(|_| format!("invalid timestamp '{scheduled_raw}' in column 'scheduled'"))?;

        let port_back = clean(record.get(10))
            .map(|s| s.eq_ignore_ascii_case("sim"))
            .unwrap_or(false);

        Ok(Self {
            record_type: parse_req(record.get(0), "type")?,
            ticket_number: parse_req(record.get(1), "ticket")?,
            terminal_number: parse_req(record.get(2), "terminal")?,
            receiving_carrier: parse_opt(record.get(3)),
            receiving_name: clean(record.get(4)),
            donor_carrier: parse_opt(record.get(5)),
            donor_name: clean(record.get(6)),
            scheduled_at,
            status_code: parse_opt(record.get(8)),
            status: clean(record.get(9)),
            port_back_flag: i16::from(port_back),
            source_file: source_file.to_string(),
        })
    }
}

impl StagingRow for PortabilityRow {
    fn write_copy_row(&self, buf: &mut String) {
        buf.push_str(&self.record_type.to_string());
        buf.push('\t');
        buf.push_str(&self.ticket_number.to_string());
        buf.push('\t');
        buf.push_str(&self.terminal_number.to_string());
        buf.push('\t');
        push_opt_display(buf, self.receiving_carrier);
        buf.push('\t');
        push_opt(buf, self.receiving_name.as_deref());
        buf.push('\t');
        push_opt_display(buf, self.donor_carrier);
        buf.push('\t');
        push_opt(buf, self.donor_name.as_deref());
        buf.push('\t');
        buf.push_str(&self.scheduled_at.format("%Y-%m-%d %H:%M:%S").to_string());
        buf.push('\t');
        push_opt_display(buf, self.status_code);
        buf.push('\t');
        push_opt(buf, self.status.as_deref());
        buf.push('\t');
        buf.push_str(&self.port_back_flag.to_string());
        buf.push('\t');
        push_field(buf, &self.source_file);
        buf.push('\n');
    }
}

/// One designation range from a ranged numbering-plan export
/// (STFC, STFC-FATB, SMP or SME).
#[derive(Debug, Clone, PartialEq)]
pub struct NumberingRow {
    pub carrier_name: Option<String>,
    pub carrier_cnpj: Option<String>,
    pub uf: Option<String>,
    pub cn: i16,
    pub prefix: i32,
    pub range_start: i64,
    pub range_end: i64,
    /// STFC locality columns, absent for mobile services.
    pub cnl_code: Option<String>,
    pub locality: Option<String>,
    pub local_area: Option<String>,
    pub local_area_acronym: Option<String>,
    pub local_area_code: Option<i32>,
    pub status: Option<String>,
    pub service: String,
    pub source_file: String,
}

impl NumberingRow {
    /// STFC exports carry 13 columns (with locality data); SMP and SME
    /// carry 8. Both start with
    /// `carrier;cnpj;uf;cn;prefix;range_start;range_end`.
    pub fn from_record(
        record: &StringRecord,
        kind: NumberingKind,
        source_file: &str,
    ) -> Result<Self, String> {
        let is_stfc = matches!(kind, NumberingKind::Stfc | NumberingKind::StfcFatb);
        let expected = if is_stfc { 13 } else { 8 };
        if record.len() < expected {
            return Err(format!(
                "expected {expected} columns for {}, found {}",
                kind.service_label(),
                record.len()
            ));
        }

        let (cnl_code, locality, local_area, local_area_acronym, local_area_code, status) =
            if is_stfc {
                (
                    clean(record.get(7)),
                    clean(record.get(8)),
                    clean(record.get(9)),
                    clean(record.get(10)),
                    parse_opt(record.get(11)),
                    clean(record.get(12)),
                )
            } else {
                (None, None, None, None, None, clean(record.get(7)))
            };

        Ok(Self {
            carrier_name: clean(record.get(0)),
            carrier_cnpj: clean(record.get(1)),
            uf: clean(record.get(2)),
            cn: parse_req(record.get(3), "cn")?,
            prefix: parse_req(record.get(4), "prefix")?,
            range_start: parse_req(record.get(5), "range_start")?,
            range_end: parse_req(record.get(6), "range_end")?,
            cnl_code,
            locality,
            local_area,
            local_area_acronym,
            local_area_code,
            status,
            service: kind.service_label().to_string(),
            source_file: source_file.to_string(),
        })
    }
}

impl StagingRow for NumberingRow {
    fn write_copy_row(&self, buf: &mut String) {
        push_opt(buf, self.carrier_name.as_deref());
        buf.push('\t');
        push_opt(buf, self.carrier_cnpj.as_deref());
        buf.push('\t');
        push_opt(buf, self.uf.as_deref());
        buf.push('\t');
        buf.push_str(&self.cn.to_string());
        buf.push('\t');
        buf.push_str(&self.prefix.to_string());
        buf.push('\t');
        buf.push_str(&self.range_start.to_string());
        buf.push('\t');
        buf.push_str(&self.range_end.to_string());
        buf.push('\t');
        push_opt(buf, self.cnl_code.as_deref());
        buf.push('\t');
        push_opt(buf, self.locality.as_deref());
        buf.push('\t');
        push_opt(buf, self.local_area.as_deref());
        buf.push('\t');
        push_opt(buf, self.local_area_acronym.as_deref());
        buf.push('\t');
        push_opt_display(buf, self.local_area_code);
        buf.push('\t');
        push_opt(buf, self.status.as_deref());
        buf.push('\t');
        push_field(buf, &self.service);
        buf.push('\t');
        push_field(buf, &self.source_file);
        buf.push('\n');
    }
}

/// One non-geographic code (0800/0300/...) from a CNG export.
#[derive(Debug, Clone, PartialEq)]
pub struct CngRow {
    pub carrier_name: Option<String>,
    pub carrier_cnpj: Option<String>,
    pub code: i64,
    pub status: Option<String>,
    pub source_file: String,
}

impl CngRow {
    pub fn from_record(record: &StringRecord, source_file: &str) -> Result<Self, String> {
        if record.len() < 4 {
            return Err(format!("expected 4 columns, found {}", record.len()));
        }
        Ok(Self {
            carrier_name: clean(record.get(0)),
            carrier_cnpj: clean(record.get(1)),
            code: parse_req(record.get(2), "code")?,
            status: clean(record.get(3)),
            source_file: source_file.to_string(),
        })
    }
}

impl StagingRow for CngRow {
    fn write_copy_row(&self, buf: &mut String) {
        push_opt(buf, self.carrier_name.as_deref());
        buf.push('\t');
        push_opt(buf, self.carrier_cnpj.as_deref());
        buf.push('\t');
        buf.push_str(&self.code.to_string());
        buf.push('\t');
        push_opt(buf, self.status.as_deref());
        buf.push('\t');
        push_field(buf, &self.source_file);
        buf.push('\n');
    }
}

/// One public-utility service number from a SUP export.
#[derive(Debug, Clone, PartialEq)]
pub struct SupRow {
    pub carrier_name: Option<String>,
    pub carrier_cnpj: Option<String>,
    pub sup_number: i64,
    pub extension: Option<i32>,
    pub uf: Option<String>,
    pub cn: Option<i16>,
    pub municipality_code: Option<i32>,
    pub municipality: Option<String>,
    pub institution: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub source_file: String,
}

impl SupRow {
    pub fn from_record(record: &StringRecord, source_file: &str) -> Result<Self, String> {
        if record.len() < 11 {
            return Err(format!("expected 11 columns, found {}", record.len()));
        }
        Ok(Self {
            carrier_name: clean(record.get(0)),
            carrier_cnpj: clean(record.get(1)),
            sup_number: parse_req(record.get(2), "sup_number")?,
            extension: parse_opt(record.get(3)),
            uf: clean(record.get(4)),
            cn: parse_opt(record.get(5)),
            municipality_code: parse_opt(record.get(6)),
            municipality: clean(record.get(7)),
            institution: clean(record.get(8)),
            category: clean(record.get(9)),
            status: clean(record.get(10)),
            source_file: source_file.to_string(),
        })
    }
}

impl StagingRow for SupRow {
    fn write_copy_row(&self, buf: &mut String) {
        push_opt(buf, self.carrier_name.as_deref());
        buf.push('\t');
        push_opt(buf, self.carrier_cnpj.as_deref());
        buf.push('\t');
        buf.push_str(&self.sup_number.to_string());
        buf.push('\t');
        push_opt_display(buf, self.extension);
        buf.push('\t');
        push_opt(buf, self.uf.as_deref());
        buf.push('\t');
        push_opt_display(buf, self.cn);
        buf.push('\t');
        push_opt_display(buf, self.municipality_code);
        buf.push('\t');
        push_opt(buf, self.municipality.as_deref());
        buf.push('\t');
        push_opt(buf, self.institution.as_deref());
        buf.push('\t');
        push_opt(buf, self.category.as_deref());
        buf.push('\t');
        push_opt(buf, self.status.as_deref());
        buf.push('\t');
        push_field(buf, &self.source_file);
        buf.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[&str]) -> StringRecord {
        StringRecord::from(fields.to_vec())
    }

    #[test]
    fn test_portability_row_parses_and_encodes() {
        let rec = record(&[
            "0",
            "123456789",
            "11987654321",
            "21",
            "VIVO",
            "14",
            "OI",
            "15/03/2024 10:22:05",
            "6",
            "Concluida",
            "Nao",
        ]);
        let row = PortabilityRow::from_record(&rec, "pip_20240315.csv.gz").unwrap();
        assert_eq!(row.terminal_number, 11987654321);
        assert_eq!(row.receiving_carrier, Some(21));
        assert_eq!(row.port_back_flag, 0);
        assert_eq!(
            row.scheduled_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-03-15 10:22:05"
        );

        let mut buf = String::new();
        row.write_copy_row(&mut buf);
        assert_eq!(
            buf,
            "0\t123456789\t11987654321\t21\tVIVO\t14\tOI\t2024-03-15 10:22:05\t6\tConcluida\t0\tpip_20240315.csv.gz\n"
        );
    }

    #[test]
    fn test_portability_port_back_sim() {
        let rec = record(&[
            "0",
            "1",
            "11987654321",
            "",
            "",
            "",
            "",
            "01/01/2024 00:00:00",
            "",
            "",
            "Sim",
        ]);
        let row = PortabilityRow::from_record(&rec, "f").unwrap();
        assert_eq!(row.port_back_flag, 1);
        assert_eq!(row.receiving_carrier, None);
    }

    #[test]
    fn test_portability_invalid_timestamp() {
        let rec = record(&[
            "0", "1", "11987654321", "", "", "", "", "2024-13-99", "", "", "Nao",
        ]);
        let err = PortabilityRow::from_record(&rec, "f").unwrap_err();
        assert!(err.contains("invalid timestamp"));
    }

    #[test]
    fn test_numbering_row_smp() {
        let rec = record(&[
            "TIM S.A.",
            "02421421000111",
            "SP",
            "11",
            "98765",
            "0",
            "9999",
            "Ativo",
        ]);
        let row = NumberingRow::from_record(&rec, NumberingKind::Smp, "SMP_202403.zip").unwrap();
        assert_eq!(row.cn, 11);
        assert_eq!(row.prefix, 98765);
        assert_eq!(row.range_end, 9999);
        assert_eq!(row.service, "SMP");
        assert_eq!(row.cnl_code, None);
    }

    #[test]
    fn test_numbering_row_stfc_locality_columns() {
        let rec = record(&[
            "TELEFONICA",
            "02558157000162",
            "SP",
            "11",
            "3210",
            "0",
            "9999",
            "SPO",
            "Sao Paulo",
            "Sao Paulo",
            "SPO",
            "11",
            "Ativo",
        ]);
        let row = NumberingRow::from_record(&rec, NumberingKind::Stfc, "STFC_202403.zip").unwrap();
        assert_eq!(row.locality.as_deref(), Some("Sao Paulo"));
        assert_eq!(row.local_area_code, Some(11));
        assert_eq!(row.service, "STFC");
    }

    #[test]
    fn test_numbering_row_short_record() {
        let rec = record(&["TIM", "123", "SP", "11"]);
        let err = NumberingRow::from_record(&rec, NumberingKind::Smp, "f").unwrap_err();
        assert!(err.contains("expected 8 columns"));
    }

    #[test]
    fn test_copy_quoting_special_characters() {
        let mut buf = String::new();
        push_field(&mut buf, "EMPRESA \"X\"\tLTDA");
        assert_eq!(buf, "\"EMPRESA \"\"X\"\"\tLTDA\"");

        let mut plain = String::new();
        push_field(&mut plain, "EMPRESA X LTDA");
        assert_eq!(plain, "EMPRESA X LTDA");
    }

    #[test]
    fn test_cng_row() {
        let rec = record(&["EMBRATEL", "33530486000129", "08001234567", "Ativo"]);
        let row = CngRow::from_record(&rec, "CNG_202403.zip").unwrap();
        assert_eq!(row.code, 8001234567);

        let mut buf = String::new();
        row.write_copy_row(&mut buf);
        assert!(buf.ends_with("CNG_202403.zip\n"));
    }

    #[test]
    fn test_sup_row_with_blanks() {
        let rec = record(&[
            "PREFEITURA",
            "",
            "156",
            "",
            "SP",
            "11",
            "3550308",
            "Sao Paulo",
            "Atendimento",
            "Municipal",
            "Ativo",
        ]);
        let row = SupRow::from_record(&rec, "SUP_202403.zip").unwrap();
        assert_eq!(row.sup_number, 156);
        assert_eq!(row.carrier_cnpj, None);
        assert_eq!(row.extension, None);

        let mut buf = String::new();
        row.write_copy_row(&mut buf);
        assert!(buf.contains("\\N"));
    }
}
