//! Record kind classification.
//!
//! Numbering-plan exports are published under a filename convention
//! (`STFC_...zip`, `SMP_...zip`, ...). Classification is a closed match
//! over the known prefixes; anything else is a classification error for
//! that file, never a guess.

use std::path::Path;

use abr_common::{AbrError, Result};

/// The two source-file families, each with its own expected extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFamily {
    /// PIP portability reports, gzip-compressed delimited text
    Portability,
    /// NSAPN numbering-plan exports, zip archives of delimited text
    NumberingPlan,
}

impl RecordFamily {
    /// Filename suffix used when scanning directories for this family.
    pub fn extension(self) -> &'static str {
        match self {
            RecordFamily::Portability => ".csv.gz",
            RecordFamily::NumberingPlan => ".zip",
        }
    }
}

/// The six numbering-plan subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberingKind {
    /// Fixed telephony, full column set
    Stfc,
    /// Fixed telephony outside the basic tariff area
    StfcFatb,
    /// Personal mobile service
    Smp,
    /// Specialized mobile service
    Sme,
    /// Non-geographic codes (0800, 0300, ...)
    Cng,
    /// Public utility services
    Sup,
}

impl NumberingKind {
    /// Infer the subtype from the export's filename prefix.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let upper = name.to_uppercase();
        if upper.starts_with("STFC-FATB") || upper.starts_with("STFC_FATB") {
            Some(NumberingKind::StfcFatb)
        } else if upper.starts_with("STFC") {
            Some(NumberingKind::Stfc)
        } else if upper.starts_with("SMP") {
            Some(NumberingKind::Smp)
        } else if upper.starts_with("SME") {
            Some(NumberingKind::Sme)
        } else if upper.starts_with("CNG") {
            Some(NumberingKind::Cng)
        } else if upper.starts_with("SUP") {
            Some(NumberingKind::Sup)
        } else {
            None
        }
    }

    /// Classify a path, failing with a typed error when the prefix is
    /// not one of the known subtypes.
    pub fn classify(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::from_file_name(&name).ok_or(AbrError::Classification { file: name })
    }

    /// Value stored in the `service` column of ranged staging rows.
    pub fn service_label(self) -> &'static str {
        match self {
            NumberingKind::Stfc => "STFC",
            NumberingKind::StfcFatb => "STFC-FATB",
            NumberingKind::Smp => "SMP",
            NumberingKind::Sme => "SME",
            NumberingKind::Cng => "CNG",
            NumberingKind::Sup => "SUP",
        }
    }

    /// Short lowercase name used in decode-error reports.
    pub fn name(self) -> &'static str {
        match self {
            NumberingKind::Stfc => "stfc",
            NumberingKind::StfcFatb => "stfc-fatb",
            NumberingKind::Smp => "smp",
            NumberingKind::Sme => "sme",
            NumberingKind::Cng => "cng",
            NumberingKind::Sup => "sup",
        }
    }

    /// Whether rows of this subtype carry (prefix, range) designations.
    /// STFC/STFC-FATB/SMP/SME share one staging table; CNG and SUP have
    /// their own.
    pub fn is_ranged(self) -> bool {
        matches!(
            self,
            NumberingKind::Stfc | NumberingKind::StfcFatb | NumberingKind::Smp | NumberingKind::Sme
        )
    }
}

/// Fully classified record kind of one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Portability,
    Numbering(NumberingKind),
}

impl RecordKind {
    pub fn name(self) -> &'static str {
        match self {
            RecordKind::Portability => "portability",
            RecordKind::Numbering(kind) => kind.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_all_known_prefixes() {
        let cases = [
            ("STFC_202401.zip", NumberingKind::Stfc),
            ("STFC-FATB_202401.zip", NumberingKind::StfcFatb),
            ("STFC_FATB_202401.zip", NumberingKind::StfcFatb),
            ("SMP_202401.zip", NumberingKind::Smp),
            ("SME_202401.zip", NumberingKind::Sme),
            ("CNG_202401.zip", NumberingKind::Cng),
            ("SUP_202401.zip", NumberingKind::Sup),
            ("smp_lowercase.zip", NumberingKind::Smp),
        ];
        for (name, expected) in cases {
            assert_eq!(NumberingKind::from_file_name(name), Some(expected), "{name}");
        }
    }

    #[test]
    fn test_classify_unrecognized_prefix_is_error() {
        assert_eq!(NumberingKind::from_file_name("PLAN_2024.zip"), None);

        let err = NumberingKind::classify(Path::new("/data/PLAN_2024.zip")).unwrap_err();
        assert_eq!(err.kind(), "classification");
    }

    #[test]
    fn test_ranged_subtypes() {
        assert!(NumberingKind::Stfc.is_ranged());
        assert!(NumberingKind::Smp.is_ranged());
        assert!(!NumberingKind::Cng.is_ranged());
        assert!(!NumberingKind::Sup.is_ranged());
    }

    #[test]
    fn test_family_extensions() {
        assert_eq!(RecordFamily::Portability.extension(), ".csv.gz");
        assert_eq!(RecordFamily::NumberingPlan.extension(), ".zip");
    }
}
