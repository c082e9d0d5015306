use serde::{Deserialize, Serialize};

pub const TITLE_CHARS: (usize, usize) = (10, 200);
pub const DESCRIPTION_CHARS: (usize, usize) = (50, 2000);
pub const KEYWORD_COUNT: (usize, usize) = (1, 10);
pub const KEYWORD_CHARS: (usize, usize) = (2, 50);
pub const TARGET_MARKET_MAX_CHARS: usize = 200;

/// A submitted problem to validate against public discussion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProblemStatement {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_market: Option<String>,
}

impl ProblemStatement {
    /// Checks field bounds and normalizes keywords (trimmed, lower-case).
    /// Returns every violation, not just the first.
    pub fn validate(mut self) -> Result<Self, Vec<String>> {
        let mut errs = Vec::new();

        check_len(&mut errs, "title", &self.title, TITLE_CHARS);
        check_len(&mut errs, "description", &self.description, DESCRIPTION_CHARS);

        let (min_kw, max_kw) = KEYWORD_COUNT;
        if self.keywords.len() < min_kw || self.keywords.len() > max_kw {
            errs.push(format!(
                "keywords: expected {min_kw}..={max_kw} items, got {}",
                self.keywords.len()
            ));
        }
        let (min_c, max_c) = KEYWORD_CHARS;
        for (i, kw) in self.keywords.iter().enumerate() {
            let n = kw.trim().chars().count();
            if n < min_c || n > max_c {
                errs.push(format!("keywords[{i}]: must be {min_c}..={max_c} characters after trimming"));
            }
        }

        if let Some(tm) = &self.target_market {
            if tm.chars().count() > TARGET_MARKET_MAX_CHARS {
                errs.push(format!("target_market: at most {TARGET_MARKET_MAX_CHARS} characters"));
            }
        }

        if !errs.is_empty() {
            return Err(errs);
        }

        self.keywords = self.keywords.iter().map(|k| k.trim().to_lowercase()).collect();
        Ok(self)
    }
}

fn check_len(errs: &mut Vec<String>, field: &str, value: &str, (min, max): (usize, usize)) {
    let n = value.chars().count();
    if n < min || n > max {
        errs.push(format!("{field}: must be {min}..={max} characters, got {n}"));
    }
}
