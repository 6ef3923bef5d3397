use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

/// Raised when a `{...}` span in a task description does not match the
/// `{min,max}` / `{min,max,round}` placeholder form.
#[derive(Debug, thiserror::Error)]
#[error("invalid template: {template}")]
pub struct TemplateFormatError {
    pub template: String,
}

static DETECTION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]*\}").unwrap());
static PARSING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{\s*(\d+)\s*,\s*(\d+)\s*(?:,\s*(\d+)\s*)?\}$").unwrap()
});

#[derive(Debug, Clone, Copy)]
struct RandomComponent {
    min: i64,
    max: i64,
    rounding: i64,
}

impl RandomComponent {
    fn evaluate(&self) -> i64 {
        let value = rand::thread_rng().gen_range(self.min..=self.max);
        round_to_multiple(value, self.rounding)
    }
}

// Nearest multiple of `rounding`; ties round up.
fn round_to_multiple(value: i64, rounding: i64) -> i64 {
    (value + rounding / 2) / rounding * rounding
}

#[derive(Debug)]
enum TemplatePart {
    Text(String),
    Random(RandomComponent),
}

/// A task description with zero or more randomized numeric placeholders.
///
/// Evaluation is intentionally not idempotent: every call to [`evaluate`]
/// draws fresh values. Callers that need a frozen rendering (anything that
/// gets persisted) must evaluate once and store the result.
///
/// [`evaluate`]: ParsedTemplate::evaluate
#[derive(Debug)]
pub struct ParsedTemplate {
    template: String,
    parts: Vec<TemplatePart>,
}

impl ParsedTemplate {
    pub fn new(template: &str) -> Result<Self, TemplateFormatError> {
        let mut parts = Vec::new();
        let mut current_index = 0;

        for span in DETECTION_PATTERN.find_iter(template) {
            if span.start() > current_index {
                parts.push(TemplatePart::Text(template[current_index..span.start()].to_owned()));
            }

            let captures = PARSING_PATTERN.captures(span.as_str()).ok_or_else(|| TemplateFormatError {
                template: template.to_owned(),
            })?;

            let min = parse_bound(&captures[1], template)?;
            let max = parse_bound(&captures[2], template)?;
            let rounding = match captures.get(3) {
                None => 1,
                Some(m) => parse_bound(m.as_str(), template)?,
            };

            if min > max || rounding == 0 {
                return Err(TemplateFormatError { template: template.to_owned() });
            }

            parts.push(TemplatePart::Random(RandomComponent { min, max, rounding }));
            current_index = span.end();
        }

        if current_index < template.len() {
            parts.push(TemplatePart::Text(template[current_index..].to_owned()));
        }

        Ok(Self {
            template: template.to_owned(),
            parts,
        })
    }

    /// The original template string, verbatim.
    pub fn source_template(&self) -> &str {
        &self.template
    }

    pub fn evaluate(&self) -> String {
        let mut result = String::new();

        for part in &self.parts {
            match part {
                TemplatePart::Text(text) => result.push_str(text),
                TemplatePart::Random(component) => result.push_str(&component.evaluate().to_string()),
            }
        }

        result
    }
}

fn parse_bound(digits: &str, template: &str) -> Result<i64, TemplateFormatError> {
    digits.parse().map_err(|_| TemplateFormatError {
        template: template.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_round_trips() {
        let template = ParsedTemplate::new("Pick up 5 logs").unwrap();
        assert_eq!(template.source_template(), "Pick up 5 logs");
        assert_eq!(template.evaluate(), "Pick up 5 logs");
    }

    #[test]
    fn placeholder_evaluates_within_bounds() {
        let template = ParsedTemplate::new("Kill {1,3} goblins").unwrap();

        for _ in 0..50 {
            let evaluated = template.evaluate();
            assert!(evaluated.starts_with("Kill "));
            assert!(evaluated.ends_with(" goblins"));

            let n: i64 = evaluated
                .trim_start_matches("Kill ")
                .trim_end_matches(" goblins")
                .parse()
                .unwrap();
            assert!((1..=3).contains(&n));
        }
    }

    #[test]
    fn no_spans_survive_evaluation() {
        let template = ParsedTemplate::new("{1,9} and {10,20,5} and {3,3}").unwrap();

        for _ in 0..20 {
            let evaluated = template.evaluate();
            assert!(!evaluated.contains('{'));
            assert!(!evaluated.contains('}'));
        }
    }

    #[test]
    fn values_are_rounded_to_multiples() {
        let template = ParsedTemplate::new("{10,20,5}").unwrap();

        for _ in 0..50 {
            let n: i64 = template.evaluate().parse().unwrap();
            assert_eq!(n % 5, 0);
            assert!((10..=20).contains(&n));
        }
    }

    #[test]
    fn rounding_ties_round_up() {
        assert_eq!(round_to_multiple(5, 2), 6);
        assert_eq!(round_to_multiple(6, 4), 8);
        assert_eq!(round_to_multiple(5, 4), 4);
        assert_eq!(round_to_multiple(7, 4), 8);
        assert_eq!(round_to_multiple(10, 5), 10);

        // A fixed-value placeholder makes the tie deterministic end to end.
        let template = ParsedTemplate::new("{6,6,4}").unwrap();
        assert_eq!(template.evaluate(), "8");
    }

    #[test]
    fn whitespace_around_numbers_is_tolerated() {
        let template = ParsedTemplate::new("Chop { 1 , 3 } trees").unwrap();
        let evaluated = template.evaluate();
        assert!(evaluated.starts_with("Chop "));
        assert!(!evaluated.contains('{'));
    }

    #[test]
    fn malformed_spans_are_rejected() {
        for bad in ["{1}", "{a,b}", "{1,2,3,4}", "{1,}", "{}", "{1;2}", "{-1,3}"] {
            let err = ParsedTemplate::new(bad).unwrap_err();
            assert!(err.to_string().contains(bad), "error should name the template: {}", err);
        }
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        assert!(ParsedTemplate::new("{5,1}").is_err());
        assert!(ParsedTemplate::new("{1,5,0}").is_err());
    }

    #[test]
    fn unpaired_brace_is_literal_text() {
        let template = ParsedTemplate::new("almost {1,2 a placeholder").unwrap();
        assert_eq!(template.evaluate(), "almost {1,2 a placeholder");
    }

    #[test]
    fn evaluations_are_independent() {
        let template = ParsedTemplate::new("{1,1000000}").unwrap();
        let a = template.evaluate();
        let b = template.evaluate();
        let c = template.evaluate();
        // Three identical draws from a million-wide range means a broken RNG.
        assert!(!(a == b && b == c));
    }
}
