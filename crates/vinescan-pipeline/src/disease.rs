//! The fixed disease table.
//!
//! The model's score vector is index-aligned with [`DiseaseClass::ALL`].
//! Reordering the enum variants silently breaks every prediction.

use serde::{Deserialize, Serialize};

/// One of the four classes the model distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiseaseClass {
    /// Fungal black rot.
    BlackRot,
    /// Esca, also called black measles.
    BlackMeasles,
    /// Isariopsis leaf spot (leaf blight).
    LeafBlight,
    /// No disease.
    Healthy,
}

/// Static label metadata shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiseaseRecord {
    /// Display label, identical to the class name.
    pub label: &'static str,
    /// Short description of the condition.
    pub description: &'static str,
    /// Recommended treatment.
    pub remedy: &'static str,
}

const BLACK_ROT: DiseaseRecord = DiseaseRecord {
    label: "Black Rot",
    description: "Fungal disease causing black spots on leaves and fruit.",
    remedy: "Prune infected leaves and apply fungicide as recommended.",
};

const BLACK_MEASLES: DiseaseRecord = DiseaseRecord {
    label: "Black Measles",
    description: "Disease causing black spots and necrosis.",
    remedy: "Practice orchard sanitation and control humidity.",
};

const LEAF_BLIGHT: DiseaseRecord = DiseaseRecord {
    label: "Leaf Blight",
    description: "Infection that makes leaves dry out and drop.",
    remedy: "Avoid excess moisture and spray preventive fungicide.",
};

const HEALTHY: DiseaseRecord = DiseaseRecord {
    label: "Healthy",
    description: "Leaf is healthy with no disease symptoms.",
    remedy: "Continue regular care to prevent disease.",
};

const BLACK_ROT_ID: DiseaseRecord = DiseaseRecord {
    label: "Black Rot",
    description: "Penyakit jamur yang menyebabkan bercak hitam pada daun dan buah.",
    remedy: "Pangkas daun yang terinfeksi dan gunakan fungisida sesuai anjuran.",
};

const BLACK_MEASLES_ID: DiseaseRecord = DiseaseRecord {
    label: "Black Measles",
    description: "Penyakit yang menyebabkan bercak hitam dan nekrosis.",
    remedy: "Terapkan sanitasi kebun dan kontrol kelembapan.",
};

const LEAF_BLIGHT_ID: DiseaseRecord = DiseaseRecord {
    label: "Leaf Blight",
    description: "Infeksi yang menyebabkan daun kering dan rontok.",
    remedy: "Hindari kelembaban berlebih dan semprot fungisida preventif.",
};

const HEALTHY_ID: DiseaseRecord = DiseaseRecord {
    label: "Healthy",
    description: "Daun dalam kondisi sehat tanpa gejala penyakit.",
    remedy: "Lanjutkan perawatan secara berkala untuk mencegah penyakit.",
};

/// Language of the description and remedy text.
///
/// Labels are the same in every language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordLanguage {
    /// English text.
    #[default]
    English,
    /// Bahasa Indonesia text.
    Indonesian,
}

impl DiseaseClass {
    /// Every class in model output order.
    pub const ALL: [Self; 4] = [
        Self::BlackRot,
        Self::BlackMeasles,
        Self::LeafBlight,
        Self::Healthy,
    ];

    /// Number of classes the model scores.
    pub const COUNT: usize = Self::ALL.len();

    /// Class at position `index` of the score vector, if any.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Position of this class in the score vector.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::BlackRot => 0,
            Self::BlackMeasles => 1,
            Self::LeafBlight => 2,
            Self::Healthy => 3,
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        self.record().label
    }

    /// The static record for this class.
    #[must_use]
    pub const fn record(self) -> &'static DiseaseRecord {
        match self {
            Self::BlackRot => &BLACK_ROT,
            Self::BlackMeasles => &BLACK_MEASLES,
            Self::LeafBlight => &LEAF_BLIGHT,
            Self::Healthy => &HEALTHY,
        }
    }

    /// The static record for this class in `language`.
    #[must_use]
    pub const fn record_in(self, language: RecordLanguage) -> &'static DiseaseRecord {
        match language {
            RecordLanguage::English => self.record(),
            RecordLanguage::Indonesian => match self {
                Self::BlackRot => &BLACK_ROT_ID,
                Self::BlackMeasles => &BLACK_MEASLES_ID,
                Self::LeafBlight => &LEAF_BLIGHT_ID,
                Self::Healthy => &HEALTHY_ID,
            },
        }
    }
}

impl std::fmt::Display for DiseaseClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
