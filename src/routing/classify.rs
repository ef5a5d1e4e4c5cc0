//! Rule-based query classification.
//!
//! Classification never fails: any input produces a best-effort
//! `QueryAnalysis`. Pattern families are evaluated in a fixed precedence
//! order (mathematical, then geopolitical, then creative, then general) and
//! the first family with any match wins. The order is a product decision
//! about which domain wins when keyword sets overlap; keep it intact.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::personas::Persona;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The inferred topic category of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Mathematical,
    Geopolitical,
    Creative,
    CustomFocus,
    General,
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Mathematical => "mathematical",
            Self::Geopolitical => "geopolitical",
            Self::Creative => "creative",
            Self::CustomFocus => "custom_focus",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

/// How demanding the query looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// The result of classifying one query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnalysis {
    pub query_type: QueryType,
    pub complexity: Complexity,
    pub reasoning: String,
    pub suggested_temperature: f32,
}

// ---------------------------------------------------------------------------
// Pattern families
// ---------------------------------------------------------------------------

struct PatternFamily {
    query_type: QueryType,
    temperature: f32,
    patterns: Vec<Regex>,
}

/// Ordered classification table. First family with any match wins, so the
/// Vec order IS the precedence order. Keywords cover English and Portuguese
/// since the product serves both.
static PATTERN_FAMILIES: Lazy<Vec<PatternFamily>> = Lazy::new(|| {
    vec![
        PatternFamily {
            query_type: QueryType::Mathematical,
            temperature: 0.3,
            patterns: compile_patterns(&[
                r"(?i)\b(calculate|calculus|solve|equation|derivative|integral|theorem)\b",
                r"(?i)\b(calcule|calcular|resolva|equa\u{e7}\u{e3}o|quanto \u{e9}|somar)\b",
                r"(?i)\b(probability|statistics|average|median|percentage)\b",
                r"(?i)\b(probabilidade|estat\u{ed}stica|m\u{e9}dia|porcentagem|matem\u{e1}tica)\b",
                r"(?i)how (much|many) is\b",
                // Bare arithmetic: digit, operator, digit.
                r"\d+\s*[-+*/x\u{d7}\u{f7}^%]\s*\d+",
            ]),
        },
        PatternFamily {
            query_type: QueryType::Geopolitical,
            temperature: 0.7,
            patterns: compile_patterns(&[
                r"(?i)\b(geopolitic\w*|diploma\w*|sanction\w*|tariff\w*|treaty|foreign policy)\b",
                r"(?i)\b(geopol\u{ed}tic\w*|diplomacia|san\u{e7}\u{f5}es|tarifa\w*|pol\u{ed}tica externa)\b",
                r"(?i)\b(econom\w*|trade war|inflation|gdp|central bank|interest rate)\b",
                r"(?i)\b(com\u{e9}rcio|infla\u{e7}\u{e3}o|pib|banco central|juros)\b",
                r"(?i)\b(strategic analysis|multipolar\w*|brics|opec|nato|otan)\b",
                r"(?i)\b(election\w*|elei\u{e7}\u{e3}o|elei\u{e7}\u{f5}es|government|governo)\b",
            ]),
        },
        PatternFamily {
            query_type: QueryType::Creative,
            temperature: 0.9,
            patterns: compile_patterns(&[
                r"(?i)\b(create|write|tell|compose|imagine|generate|invent)\b",
                r"(?i)\b(crie|criar|escreva|escrever|conte|componha|imagine|gere|invente)\b",
                r"(?i)\b(story|poem|song|fiction|tale|essay about)\b",
                r"(?i)\b(hist\u{f3}ria|poema|m\u{fa}sica|fic\u{e7}\u{e3}o|conto|cr\u{f4}nica)\b",
            ]),
        },
    ]
});

fn compile_patterns(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("Bad classifier pattern `{p}`: {e}")))
        .collect()
}

fn any_match(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|re| re.is_match(text))
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

fn word_count(query: &str) -> usize {
    query.split_whitespace().count()
}

/// More than two non-empty sentence-terminator-delimited segments.
fn has_multiple_clauses(query: &str) -> bool {
    query
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
        > 2
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify a query, optionally steered by a persona.
///
/// A persona focus-area match short-circuits everything else: the query is
/// tagged `custom_focus` at high complexity and the persona's temperature
/// (or 0.7) is suggested.
pub fn classify(query: &str, persona: Option<&Persona>) -> QueryAnalysis {
    if let Some(p) = persona {
        let lowered = query.to_lowercase();
        let matched = p
            .focus_areas
            .iter()
            .filter(|area| !area.trim().is_empty())
            .find(|area| lowered.contains(&area.to_lowercase()));
        if let Some(area) = matched {
            return QueryAnalysis {
                query_type: QueryType::CustomFocus,
                complexity: Complexity::High,
                reasoning: format!(
                    "query matches focus area '{}' of persona '{}'",
                    area, p.name
                ),
                suggested_temperature: p.temperature.unwrap_or(0.7),
            };
        }
    }

    let words = word_count(query);
    let multi_clause = has_multiple_clauses(query);

    for family in PATTERN_FAMILIES.iter() {
        if !any_match(&family.patterns, query) {
            continue;
        }
        let (complexity, reasoning) = match family.query_type {
            QueryType::Mathematical => {
                let c = if words > 50 {
                    Complexity::High
                } else {
                    Complexity::Medium
                };
                (c, format!("mathematical patterns detected ({words} words)"))
            }
            QueryType::Geopolitical => {
                let c = if multi_clause {
                    Complexity::High
                } else {
                    Complexity::Medium
                };
                (
                    c,
                    format!(
                        "geopolitical or economic keywords detected ({} structure)",
                        if multi_clause { "multi-clause" } else { "single-clause" }
                    ),
                )
            }
            QueryType::Creative => (
                Complexity::Medium,
                "creative writing request detected".to_string(),
            ),
            // The table only holds the three keyword families.
            QueryType::CustomFocus | QueryType::General => unreachable!(),
        };
        return QueryAnalysis {
            query_type: family.query_type,
            complexity,
            reasoning,
            suggested_temperature: family.temperature,
        };
    }

    let complexity = if words > 100 {
        Complexity::High
    } else {
        Complexity::Low
    };
    QueryAnalysis {
        query_type: QueryType::General,
        complexity,
        reasoning: format!("no domain patterns matched ({words} words)"),
        suggested_temperature: 0.7,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn persona_with_focus(areas: &[&str], temperature: Option<f32>) -> Persona {
        Persona {
            id: "p1".to_string(),
            name: "Market Analyst".to_string(),
            role: "analyst".to_string(),
            focus_areas: areas.iter().map(|s| s.to_string()).collect(),
            temperature,
            top_p: None,
            system_prompt: None,
            usage_count: 0,
            created_at: String::new(),
        }
    }

    #[test]
    fn test_arithmetic_is_mathematical() {
        let analysis = classify("What is 45 * 12?", None);
        assert_eq!(analysis.query_type, QueryType::Mathematical);
        assert!((analysis.suggested_temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_portuguese_arithmetic_is_mathematical() {
        let analysis = classify("Quanto \u{e9} 45 * 12?", None);
        assert_eq!(analysis.query_type, QueryType::Mathematical);
        assert_eq!(analysis.complexity, Complexity::Medium);
        assert!((analysis.suggested_temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_math_keyword_without_digits() {
        let analysis = classify("Solve the equation for x", None);
        assert_eq!(analysis.query_type, QueryType::Mathematical);
    }

    #[test]
    fn test_long_math_query_is_high_complexity() {
        let query = std::iter::repeat("probability of independent events")
            .take(15)
            .collect::<Vec<_>>()
            .join(" ");
        let analysis = classify(&query, None);
        assert_eq!(analysis.query_type, QueryType::Mathematical);
        assert_eq!(analysis.complexity, Complexity::High);
    }

    #[test]
    fn test_geopolitical_single_clause_is_medium() {
        let analysis = classify("What are the effects of new tariffs on trade?", None);
        assert_eq!(analysis.query_type, QueryType::Geopolitical);
        assert_eq!(analysis.complexity, Complexity::Medium);
        assert!((analysis.suggested_temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_semicolons_do_not_split_clauses() {
        // One sentence; semicolons are not sentence terminators.
        let analysis = classify(
            "Compare tariffs in Brazil; tariffs in India; tariffs in China",
            None,
        );
        assert_eq!(analysis.query_type, QueryType::Geopolitical);
        assert_eq!(analysis.complexity, Complexity::Medium);
    }

    #[test]
    fn test_geopolitical_multi_clause_is_high() {
        let analysis = classify(
            "Explain the sanctions regime. How does it affect inflation? \
             What should the central bank do?",
            None,
        );
        assert_eq!(analysis.query_type, QueryType::Geopolitical);
        assert_eq!(analysis.complexity, Complexity::High);
    }

    #[test]
    fn test_creative_is_medium() {
        let analysis = classify("Write a short poem about the ocean", None);
        assert_eq!(analysis.query_type, QueryType::Creative);
        assert_eq!(analysis.complexity, Complexity::Medium);
        assert!((analysis.suggested_temperature - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_portuguese_creative() {
        let analysis = classify("Escreva um conto sobre o mar", None);
        assert_eq!(analysis.query_type, QueryType::Creative);
    }

    #[test]
    fn test_math_wins_over_creative() {
        // "write" is a creative keyword but arithmetic takes precedence.
        let analysis = classify("Write out the steps to calculate 12 + 30", None);
        assert_eq!(analysis.query_type, QueryType::Mathematical);
    }

    #[test]
    fn test_geopolitical_wins_over_creative() {
        let analysis = classify("Write an analysis of the latest sanctions", None);
        assert_eq!(analysis.query_type, QueryType::Geopolitical);
    }

    #[test]
    fn test_unmatched_short_query_is_general_low() {
        let analysis = classify("Thoughts on my morning routine", None);
        assert_eq!(analysis.query_type, QueryType::General);
        assert_eq!(analysis.complexity, Complexity::Low);
        assert!((analysis.suggested_temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unmatched_long_query_is_general_high() {
        let query = std::iter::repeat("sobre").take(120).collect::<Vec<_>>().join(" ");
        let analysis = classify(&query, None);
        assert_eq!(analysis.query_type, QueryType::General);
        assert_eq!(analysis.complexity, Complexity::High);
    }

    #[test]
    fn test_focus_area_short_circuits_everything() {
        let persona = persona_with_focus(&["Commodity Markets"], Some(0.4));
        // Also contains arithmetic, which would otherwise classify as math.
        let analysis = classify(
            "How will 45 * 12 tonne shipments move commodity markets?",
            Some(&persona),
        );
        assert_eq!(analysis.query_type, QueryType::CustomFocus);
        assert_eq!(analysis.complexity, Complexity::High);
        assert!((analysis.suggested_temperature - 0.4).abs() < f32::EPSILON);
        assert!(analysis.reasoning.contains("Market Analyst"));
    }

    #[test]
    fn test_focus_match_is_case_insensitive() {
        let persona = persona_with_focus(&["INFLATION"], None);
        let analysis = classify("what drives inflation in small economies", Some(&persona));
        assert_eq!(analysis.query_type, QueryType::CustomFocus);
        assert!((analysis.suggested_temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_persona_without_focus_match_falls_through() {
        let persona = persona_with_focus(&["astronomy"], Some(0.2));
        let analysis = classify("Quanto \u{e9} 45 * 12?", Some(&persona));
        assert_eq!(analysis.query_type, QueryType::Mathematical);
        assert!((analysis.suggested_temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_empty_focus_areas_ignored() {
        let persona = persona_with_focus(&["", "  "], Some(0.2));
        let analysis = classify("tell me a story", Some(&persona));
        assert_eq!(analysis.query_type, QueryType::Creative);
    }

    #[test]
    fn test_never_panics_on_odd_input() {
        for query in ["", "   ", "???", "\u{1f600}\u{1f680}", "a"] {
            let analysis = classify(query, None);
            assert!(analysis.suggested_temperature >= 0.0);
            assert!(analysis.suggested_temperature <= 1.0);
        }
    }
}
