/// Text transform applied to both actual and expected output before comparing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Normalizer {
    pub ignore_case: bool,
    pub collapse_whitespace: bool,
}

impl Normalizer {
    pub fn apply(&self, text: &str) -> String {
        let text = if self.ignore_case {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        if !self.collapse_whitespace {
            return text;
        }

        let mut out = text
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n");
        if text.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}
