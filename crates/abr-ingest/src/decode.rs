//! Decompression and delimited-text decoding.
//!
//! Registry exports are Latin-1 encoded, `;`-delimited, with one header
//! row. Portability reports arrive gzip-compressed; numbering-plan
//! exports are zip archives whose first entry holds the payload.
//! Decoding streams rows one at a time; a row that fails coercion
//! becomes a skippable [`DecodeError`] item, while a failure of the
//! underlying stream (corrupt gzip, disk error) is fatal for the file.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;

use abr_common::{AbrError, DecodeError, Result};

/// Decode Latin-1 bytes. Every byte maps directly to the Unicode code
/// point with the same value, so this never fails.
pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// What went wrong with one item of a decode stream.
///
/// A `Row` failure is recorded and skipped; the stream continues. A
/// `Stream` failure means the source itself is unreadable past this
/// point, so the file must be failed rather than half-imported.
#[derive(Debug)]
pub enum DecodeFailure {
    Row(DecodeError),
    Stream(AbrError),
}

/// Open a gzip-compressed export for streaming reads.
pub fn open_gzip(path: &Path) -> Result<GzDecoder<BufReader<File>>> {
    let file = File::open(path).map_err(|source| AbrError::Io {
        file: path.display().to_string(),
        source,
    })?;
    Ok(GzDecoder::new(BufReader::new(file)))
}

/// Extract the first file entry from a zip archive.
///
/// NSAPN exports package a single delimited file per archive; the whole
/// entry is decompressed up front since the zip reader does not hand
/// out independently-owned entry readers.
pub fn open_zip_entry(path: &Path) -> Result<Cursor<Vec<u8>>> {
    let archive_name = path.display().to_string();
    let io_err = |source: std::io::Error| AbrError::Io {
        file: archive_name.clone(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| {
        AbrError::InputFormat(format!("'{archive_name}' is not a zip archive: {e}"))
    })?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| {
            AbrError::InputFormat(format!("corrupt zip entry in '{archive_name}': {e}"))
        })?;
        if entry.is_dir() {
            continue;
        }
        let mut payload = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut payload).map_err(io_err)?;
        tracing::debug!(
            file = %archive_name,
            entry = %entry.name(),
            bytes = payload.len(),
            "extracted zip entry"
        );
        return Ok(Cursor::new(payload));
    }

    Err(AbrError::InputFormat(format!(
        "zip archive '{archive_name}' contains no file entries"
    )))
}

/// Stream decoded rows from a delimited reader.
///
/// Yields `Ok(row)` per coercible record and
/// `Err(DecodeFailure::Row(..))` per malformed one; the iterator keeps
/// going either way. A read failure of the underlying stream yields
/// `Err(DecodeFailure::Stream(..))` and ends the iterator. Line numbers
/// start at 2, accounting for the skipped header row.
pub fn rows<R, T, F>(
    reader: R,
    file: String,
    kind: &'static str,
    parse: F,
) -> impl Iterator<Item = std::result::Result<T, DecodeFailure>>
where
    R: Read,
    F: Fn(&StringRecord) -> std::result::Result<T, String>,
{
    let csv_reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    csv_reader
        .into_byte_records()
        .enumerate()
        .map(move |(index, record)| {
            let line = index as u64 + 2;
            let byte_record = match record {
                Ok(rec) => rec,
                Err(err) => {
                    let text = err.to_string();
                    return Err(match err.into_kind() {
                        csv::ErrorKind::Io(source) => DecodeFailure::Stream(AbrError::Io {
                            file: file.clone(),
                            source,
                        }),
                        _ => DecodeFailure::Row(DecodeError {
                            file: file.clone(),
                            line,
                            kind,
                            reason: format!("malformed record: {text}"),
                        }),
                    });
                }
            };

            // Fields are Latin-1; re-encode each one rather than the
            // whole payload so streaming sources stay streamed.
            let mut decoded = StringRecord::new();
            for field in byte_record.iter() {
                decoded.push_field(&latin1(field));
            }

            parse(&decoded).map_err(|reason| {
                DecodeFailure::Row(DecodeError {
                    file: file.clone(),
                    line,
                    kind,
                    reason,
                })
            })
        })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;
    use crate::models::PortabilityRow;

    #[test]
    fn test_latin1_accents() {
        // "SÃO" in Latin-1: 0x53 0xC3 0x4F
        assert_eq!(latin1(&[0x53, 0xC3, 0x4F]), "SÃO");
        assert_eq!(latin1(b"plain ascii"), "plain ascii");
    }

    #[test]
    fn test_rows_skips_header_and_counts_lines() {
        let payload = "a;b\n1;x\nbad\n2;y\n";
        let items: Vec<_> = rows(payload.as_bytes(), "t.csv".to_string(), "test", |rec| {
            rec.get(0)
                .and_then(|f| f.parse::<i32>().ok())
                .and_then(|n| rec.get(1).map(|s| (n, s.to_string())))
                .ok_or_else(|| "short row".to_string())
        })
        .collect();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().0, 1);
        match items[1].as_ref().unwrap_err() {
            DecodeFailure::Row(err) => assert_eq!(err.line, 3),
            other => panic!("expected row failure, got {other:?}"),
        }
        assert_eq!(items[2].as_ref().unwrap().0, 2);
    }

    #[test]
    fn test_gzip_round_trip_through_portability_decode() {
        let raw = "tipo;bilhete;terminal;recv;recv_nome;doadora;doadora_nome;agendamento;situacao_cod;situacao;portback\n\
                   0;42;11987654321;21;VIVO;14;OI;15/03/2024 10:22:05;6;Concluida;Nao\n";
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(raw.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PIP_20240315.csv.gz");
        std::fs::write(&path, compressed).unwrap();

        let reader = open_gzip(&path).unwrap();
        let decoded: Vec<_> = rows(
            reader,
            "PIP_20240315.csv.gz".to_string(),
            "portability",
            |rec| PortabilityRow::from_record(rec, "PIP_20240315.csv.gz"),
        )
        .collect();

        assert_eq!(decoded.len(), 1);
        let row = decoded[0].as_ref().unwrap();
        assert_eq!(row.terminal_number, 11987654321);
        assert_eq!(row.receiving_name.as_deref(), Some("VIVO"));
    }

    #[test]
    fn test_truncated_gzip_is_a_stream_failure() {
        // Enough rows that the payload cannot fit in the decoder's
        // lookahead, so the truncation is hit mid-iteration.
        let mut raw = String::from("a;b\n");
        for i in 0..20_000 {
            raw.push_str(&format!("{i};value-{i}\n"));
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(raw.as_bytes()).unwrap();
        let mut compressed = encoder.finish().unwrap();
        compressed.truncate(compressed.len() / 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PIP_truncated.csv.gz");
        std::fs::write(&path, compressed).unwrap();

        let reader = open_gzip(&path).unwrap();
        let mut rows_ok = 0u64;
        let mut stream_failure = None;
        for item in rows(reader, "PIP_truncated.csv.gz".to_string(), "test", |rec| {
            rec.get(0)
                .map(|f| f.to_string())
                .ok_or_else(|| "short row".to_string())
        })
        .take(30_000)
        {
            match item {
                Ok(_) => rows_ok += 1,
                Err(DecodeFailure::Row(err)) => panic!("unexpected row failure: {err}"),
                Err(DecodeFailure::Stream(err)) => {
                    stream_failure = Some(err);
                    break;
                }
            }
        }

        // The truncation must surface as a fatal failure, not a clean
        // finish after however many rows decompressed.
        let err = stream_failure.expect("truncated stream must fail");
        assert_eq!(err.kind(), "io");
        assert!(rows_ok < 20_000, "only a partial file can precede the failure");
    }

    #[test]
    fn test_failing_reader_is_a_stream_failure() {
        struct BrokenReader;
        impl Read for BrokenReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "simulated device failure",
                ))
            }
        }

        let mut items = rows(BrokenReader, "dead.csv".to_string(), "test", |_rec| {
            Ok::<(), String>(())
        });

        match items.next() {
            Some(Err(DecodeFailure::Stream(err))) => assert_eq!(err.kind(), "io"),
            other => panic!("expected stream failure, got {other:?}"),
        }
    }

    #[test]
    fn test_zip_first_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SMP_202403.zip");

        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("SMP_202403.txt", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(b"header\n11;98765\n").unwrap();
        writer.finish().unwrap();

        let mut entry = open_zip_entry(&path).unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert!(contents.contains("11;98765"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = open_gzip(Path::new("/nonexistent/file.csv.gz")).unwrap_err();
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_non_zip_payload_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SMP_bogus.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();

        let err = open_zip_entry(&path).unwrap_err();
        assert_eq!(err.kind(), "input-format");
    }
}
