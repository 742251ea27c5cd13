use crate::dataset::{Dataset, Value};

/// Rows inspected for enrichment
pub const ENRICH_SAMPLE_ROWS: usize = 5;

struct Reference {
    value: &'static str,
    context: &'static str,
    source: &'static str,
}

const REFERENCES: &[Reference] = &[
    Reference {
        value: "John Doe",
        context: "Common placeholder name used in examples",
        source: "https://en.wikipedia.org/wiki/John_Doe",
    },
    Reference {
        value: "Jane Smith",
        context: "Common placeholder name for a woman in examples",
        source: "https://en.wikipedia.org/wiki/John_Doe",
    },
    Reference {
        value: "New York",
        context: "Largest city in the United States by population",
        source: "https://en.wikipedia.org/wiki/New_York_City",
    },
    Reference {
        value: "London",
        context: "Capital and largest city of the United Kingdom",
        source: "https://en.wikipedia.org/wiki/London",
    },
    Reference {
        value: "Paris",
        context: "Capital and largest city of France",
        source: "https://en.wikipedia.org/wiki/Paris",
    },
    Reference {
        value: "Tokyo",
        context: "Capital of Japan and its most populous city",
        source: "https://en.wikipedia.org/wiki/Tokyo",
    },
    Reference {
        value: "Sydney",
        context: "Most populous city in Australia",
        source: "https://en.wikipedia.org/wiki/Sydney",
    },
    Reference {
        value: "Engineer",
        context: "Professional who applies scientific principles to design and build structures, machines, or systems",
        source: "https://en.wikipedia.org/wiki/Engineer",
    },
    Reference {
        value: "Doctor",
        context: "Licensed medical practitioner",
        source: "https://en.wikipedia.org/wiki/Physician",
    },
    Reference {
        value: "Teacher",
        context: "Person who helps students acquire knowledge and skills",
        source: "https://en.wikipedia.org/wiki/Teacher",
    },
];

/// One enriched cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedField {
    pub field: String,
    pub value: String,
    pub context: &'static str,
    pub source: &'static str,
}

impl EnrichedField {
    #[inline]
    pub fn render(&self) -> String {
        format!(
            "{}: {} | Context: {} | Source: {}",
            self.field, self.value, self.context, self.source
        )
    }
}

/// Look up the text cells of the first rows in the built-in reference table.
///
/// Matching ignores case and surrounding whitespace; each distinct
/// (field, value) pair is reported once.
#[inline]
pub fn enrich_fields(dataset: &Dataset) -> Vec<EnrichedField> {
    let mut fields: Vec<EnrichedField> = Vec::new();

    for row in dataset.rows().iter().take(ENRICH_SAMPLE_ROWS) {
        for (column, value) in dataset.columns().iter().zip(row) {
            let Value::Text(text) = value else {
                continue;
            };
            let text = text.trim();
            let Some(reference) = REFERENCES
                .iter()
                .find(|reference| reference.value.eq_ignore_ascii_case(text))
            else {
                continue;
            };

            let duplicate = fields
                .iter()
                .any(|existing| existing.field == *column && existing.value == text);
            if !duplicate {
                fields.push(EnrichedField {
                    field: column.clone(),
                    value: text.to_string(),
                    context: reference.context,
                    source: reference.source,
                });
            }
        }
    }

    fields
}
