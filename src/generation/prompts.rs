const EMBED_TEMPLATE: &str = "\
You are preparing a tabular dataset for retrieval-augmented generation.
Each row has been embedded as one vector built from its text columns.

Sample rows (CSV):
{{dataset}}

Request: {{prompt}}

Briefly describe what the embedded records contain and what kinds of
similarity queries the index will answer well.
";

const CLEAN_TEMPLATE: &str = "\
You are a data cleaning assistant. Fix inconsistent formatting, obvious typos
and invalid values in the dataset below. Keep the same columns.

Dataset (CSV):
{{dataset}}

Request: {{prompt}}

Return the cleaned rows as CSV inside a ```csv fenced block, followed by a
short list of the changes you made.
";

const GENERATE_TEMPLATE: &str = "\
You generate realistic synthetic tabular data.

Example rows (CSV, may be empty):
{{dataset}}

Request: {{prompt}}

Return only the generated rows as CSV with a header line inside a ```csv
fenced block.
";

const ENRICH_TEMPLATE: &str = "\
You add background context to tabular records.

Dataset (CSV):
{{dataset}}

Request: {{prompt}}

For each notable value give one line in the form
Field: Value | Context: <one sentence> | Source: <reference>
";

/// Prompt templates with `{{dataset}}` and `{{prompt}}` placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    Embed,
    Clean,
    Generate,
    Enrich,
}

impl PromptTemplate {
    #[inline]
    pub fn template(self) -> &'static str {
        match self {
            Self::Embed => EMBED_TEMPLATE,
            Self::Clean => CLEAN_TEMPLATE,
            Self::Generate => GENERATE_TEMPLATE,
            Self::Enrich => ENRICH_TEMPLATE,
        }
    }

    #[inline]
    pub fn fill(self, dataset: &str, prompt: &str) -> String {
        self.template()
            .replace("{{dataset}}", dataset)
            .replace("{{prompt}}", prompt)
    }
}
