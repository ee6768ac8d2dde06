//! Text Normalizer
//!
//! An ordered list of regex substitutions folded over a plaintext body.
//! A routine whose pattern does not compile is logged and left out; the
//! remaining routines still run in order.

use regex::Regex;

/// One substitution step
#[derive(Debug, Clone, Copy)]
pub struct Routine {
    pub name: &'static str,
    pub pattern: &'static str,
    pub replacement: &'static str,
}

pub const PLAINTEXT_ROUTINES: &[Routine] = &[
    Routine {
        name: "carriage_returns",
        pattern: r"\r",
        replacement: "",
    },
    Routine {
        name: "newlines",
        pattern: r"\n",
        replacement: " ",
    },
    Routine {
        name: "reply_preamble",
        pattern: r"On\s\w{3},?\s.*?<\s?\S*?@\S*?\s?>.*",
        replacement: "",
    },
    Routine {
        name: "html_remnants",
        pattern: r"<.*?/>|<.*?></.*?>",
        replacement: "",
    },
    Routine {
        name: "urls",
        pattern: r"http?s?://\S+",
        replacement: "",
    },
    Routine {
        name: "inline_css",
        pattern: r#"\w*?="\S+|\S*?:\s?\S*?;"?"#,
        replacement: "",
    },
    Routine {
        name: "repeated_spaces",
        pattern: r" {1,}",
        replacement: " ",
    },
    Routine {
        name: "angle_tags",
        pattern: r"<\S*?>",
        replacement: "",
    },
];

#[derive(Debug, Clone)]
struct CompiledRoutine {
    name: &'static str,
    re: Regex,
    replacement: &'static str,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    routines: Vec<CompiledRoutine>,
}

impl Normalizer {
    pub fn new(routines: &[Routine]) -> Self {
        let routines = routines
            .iter()
            .filter_map(|r| match Regex::new(r.pattern) {
                Ok(re) => Some(CompiledRoutine {
                    name: r.name,
                    re,
                    replacement: r.replacement,
                }),
                Err(e) => {
                    tracing::warn!("Skipping normalizer routine {}: {}", r.name, e);
                    None
                }
            })
            .collect();

        Self { routines }
    }

    pub fn plaintext() -> Self {
        Self::new(PLAINTEXT_ROUTINES)
    }

    pub fn routine_names(&self) -> Vec<&'static str> {
        self.routines.iter().map(|r| r.name).collect()
    }

    pub fn normalize(&self, input: &str) -> String {
        self.routines
            .iter()
            .fold(input.to_string(), |text, routine| {
                routine
                    .re
                    .replace_all(&text, routine.replacement)
                    .into_owned()
            })
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::plaintext()
    }
}
