/*!
End-to-end tests over the public `check` API: the soundness and
completeness corpora, anchoring behavior, witness validity, determinism,
budget safety and serialization stability.
*/

use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::config::{Budget, CheckerKind, Config, MatchMode};
use crate::diagnostics::{Checker, Complexity, Status};
use crate::vm;
use crate::{check, check_with, is_safe, is_vulnerable, Flags};

#[test]
fn safe_corpus() {
    for src in ["^a+$", "^[a-z]+$", "^(a|b)+$", r"^\d{1,10}$", "^hello$"] {
        let result = check(src);
        assert_eq!(result.status, Status::Safe, "{src}: {}", result.message);
        assert_eq!(result.complexity, Some(Complexity::Safe), "{src}");
        assert_eq!(result.complexity.unwrap().summary(), "O(n)");
    }
}

#[test]
fn vulnerable_corpus_is_exponential() {
    for src in ["^(a+)+$", "^(a|a)*$", "^(a|b|ab)*$", "^([a-z]+)+$", "^(a*)*$"]
    {
        let result = check(src);
        assert_eq!(
            result.status,
            Status::Vulnerable,
            "{src}: {}",
            result.message
        );
        let complexity = result.complexity.unwrap();
        assert!(complexity.is_exponential(), "{src}: got {complexity}");
        assert!(result.attack.is_some(), "{src}");
        assert!(result.hotspot.is_some(), "{src}");
        assert_eq!(result.checker, Checker::Automaton, "{src}");
    }
}

#[test]
fn polynomial_degrees() {
    let result = check(".*a.*a.*");
    assert_eq!(result.status, Status::Vulnerable, "{}", result.message);
    assert_eq!(result.complexity, Some(Complexity::Polynomial(2)));
    assert_eq!(result.complexity.unwrap().summary(), "O(n^2)");

    let result = check(".*a.*a.*a.*");
    assert_eq!(result.status, Status::Vulnerable, "{}", result.message);
    assert_eq!(result.complexity, Some(Complexity::Polynomial(3)));
}

#[test]
fn anchors_gate_exploitability() {
    // Unanchored, nothing mandatory afterwards: matches escape early.
    assert_eq!(check("(a*)*").status, Status::Safe);
    // Anchored: the engine must reach the end of the input.
    let anchored = check("^(a*)*$");
    assert_eq!(anchored.status, Status::Vulnerable);
    assert!(anchored.complexity.unwrap().is_exponential());
    // No `$`, but the mandatory `@` acts as a continuation.
    let continuation = check("^([^@]+)+@");
    assert_eq!(continuation.status, Status::Vulnerable);
    assert!(continuation.complexity.unwrap().is_exponential());
}

#[test]
fn witness_reproduces_reported_growth() {
    for src in ["^(a+)+$", "^(a*)*$", "^([^@]+)+@", ".*a.*a.*"] {
        let result = check(src);
        assert_eq!(result.status, Status::Vulnerable, "{src}");
        let attack = result.attack.unwrap();
        let complexity = result.complexity.unwrap();

        let pattern = crate::parser::parse(src, Flags::default()).unwrap();
        let prog = vm::compile(&pattern);
        let short =
            vm::measure(&prog, &attack.string(8), 1 << 22, Budget::unlimited());
        let long = vm::measure(
            &prog,
            &attack.string(24),
            1 << 22,
            Budget::unlimited(),
        );
        let ratio = long.steps as f64 / short.steps.max(1) as f64;
        if complexity.is_exponential() {
            assert!(
                long.limited || ratio >= 100.0,
                "{src}: ratio {ratio:.1}"
            );
        } else {
            // Polynomial: clearly super-linear on a 3× length increase.
            assert!(ratio >= 4.0, "{src}: ratio {ratio:.1}");
        }
    }
}

#[test]
fn deterministic_diagnostics() {
    let config = Config::default().random_seed(1234);
    for src in ["^(a+)+$", ".*a.*a.*", "^a+$", r"^(ab)\1+$"] {
        let a = check_with(src, Flags::default(), &config);
        let b = check_with(src, Flags::default(), &config);
        assert_eq!(a.to_json(), b.to_json(), "{src}");
    }
}

#[test]
fn budget_safety() {
    // A zero budget must come back quickly and gracefully.
    let config = Config::default().timeout(Duration::ZERO);
    for src in ["^(a+)+$", "^a+$", r"^(ab)\1$"] {
        let start = std::time::Instant::now();
        let result = check_with(src, Flags::default(), &config);
        assert!(start.elapsed() < Duration::from_secs(3), "{src}");
        assert!(
            matches!(result.status, Status::Unknown | Status::Safe),
            "{src}: {:?}",
            result.status
        );
        if result.status == Status::Unknown {
            assert!(result.message.contains("budget"), "{src}");
        }
    }
}

#[test]
fn serialization_round_trip() {
    for src in ["^(a+)+$", "^a+$", "([invalid"] {
        let result = check(src);
        let json = result.to_json();
        let back = crate::Diagnostics::from_json(&json).unwrap();
        assert_eq!(result, back, "{src}");
    }
}

// ---------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------

#[test]
fn scenario_nested_plus() {
    let result = check("^(a+)+$");
    assert_eq!(result.status, Status::Vulnerable);
    assert_eq!(result.complexity.unwrap().summary(), "O(2^n)");
    let attack = result.attack.unwrap();
    assert_eq!(attack.prefix, "");
    assert_eq!(attack.pump, "a");
    assert_eq!(attack.suffix, "!");
}

#[test]
fn scenario_char_class_plus() {
    let result = check("^[a-z]+$");
    assert_eq!(result.status, Status::Safe);
    assert_eq!(result.complexity.unwrap().summary(), "O(n)");
    assert!(result.attack.is_none());
}

#[test]
fn scenario_double_wildcard() {
    let result = check(".*a.*a.*");
    assert_eq!(result.status, Status::Vulnerable);
    assert_eq!(result.complexity.unwrap().summary(), "O(n^2)");
    let attack = result.attack.unwrap();
    // The validated pump avoids satisfying the pattern itself.
    assert!(!attack.pump.contains('a'));
}

#[test]
fn scenario_unanchored_nested_star() {
    let result = check("(a*)*");
    assert_eq!(result.status, Status::Safe);
    assert_eq!(result.complexity.unwrap().summary(), "O(n)");
}

#[test]
fn scenario_anchored_nested_star() {
    let result = check("^(a*)*$");
    assert_eq!(result.status, Status::Vulnerable);
    assert_eq!(result.complexity.unwrap().summary(), "O(2^n)");
    let attack = result.attack.unwrap();
    assert_eq!(attack.pump, "a");
    assert_eq!(attack.suffix, "!");
}

#[test]
fn scenario_email_local_part() {
    let result = check("^([^@]+)+@");
    assert_eq!(result.status, Status::Vulnerable);
    assert_eq!(result.complexity.unwrap().summary(), "O(2^n)");
    let attack = result.attack.unwrap();
    assert_eq!(attack.pump, "a");
    assert_ne!(attack.suffix, "@");
}

// ---------------------------------------------------------------
// Driver behavior
// ---------------------------------------------------------------

#[test]
fn parse_errors_are_reported_with_offsets() {
    let result = check("(a");
    assert_eq!(result.status, Status::Error);
    let error = result.error.unwrap();
    assert!(error.contains("offset"), "{error}");
    assert!(result.complexity.is_none());
}

#[test]
fn backreferences_go_through_the_fuzzer() {
    let result = check(r"^(a+)\1+$");
    assert_eq!(result.checker, Checker::Fuzz);
    // The blowup is real and the fuzzer finds it.
    assert_eq!(result.status, Status::Vulnerable, "{}", result.message);

    // A safe backreference pattern cannot be proven safe dynamically.
    let result = check(r"^(ab)\1$");
    assert_eq!(result.checker, Checker::Fuzz);
    assert_eq!(result.status, Status::Unknown, "{}", result.message);
}

#[test]
fn explicit_automaton_checker_never_falls_back() {
    let config = Config::default().checker(CheckerKind::Automaton);
    let result = check_with(r"^(a)\1$", Flags::default(), &config);
    assert_eq!(result.status, Status::Unknown);
    assert_eq!(result.checker, Checker::Automaton);
}

#[test]
fn explicit_fuzz_checker_reports_best_effort_safe() {
    let config = Config::default().checker(CheckerKind::Fuzz);
    let result = check_with("^a+$", Flags::default(), &config);
    assert_eq!(result.status, Status::Safe);
    assert_eq!(result.checker, Checker::Fuzz);
    assert!(result.message.contains("not a proof"));
}

#[test]
fn full_match_mode_is_conservative() {
    let config = Config::default().match_mode(MatchMode::Full);
    let result = check_with("(a*)*", Flags::default(), &config);
    assert_eq!(result.status, Status::Vulnerable);
}

#[test]
fn skip_recall_trusts_the_static_witness() {
    let config = Config::default().skip_recall(true);
    let result = check_with("^(a+)+$", Flags::default(), &config);
    assert_eq!(result.status, Status::Vulnerable);
}

#[test]
fn case_insensitive_overlap() {
    let result = check_with(
        "^(a|B|Ab)*$",
        Flags::default().ignore_case(true),
        &Config::default(),
    );
    assert_eq!(result.status, Status::Vulnerable, "{}", result.message);
    assert!(result.complexity.unwrap().is_exponential());

    let result = check_with(
        "^[a-z]+$",
        Flags::default().ignore_case(true),
        &Config::default(),
    );
    assert_eq!(result.status, Status::Safe);
}

#[test]
fn convenience_predicates() {
    assert!(is_vulnerable("^(a+)+$"));
    assert!(!is_vulnerable("^a+$"));
    assert!(is_safe("^a+$"));
    assert!(!is_safe("^(a+)+$"));
    // Errors are neither safe nor vulnerable.
    assert!(!is_safe("(a"));
    assert!(!is_vulnerable("(a"));
}

#[test]
fn oversize_patterns_divert_to_fuzz() {
    let config = Config::default().max_pattern_size(10);
    let result =
        check_with("^(a+)+(b+)+(c+)+$", Flags::default(), &config);
    assert_eq!(result.checker, Checker::Fuzz);
}

#[test]
fn hotspot_points_into_the_source() {
    let result = check("^(a+)+$");
    let hotspot = result.hotspot.unwrap();
    assert!(hotspot.start < hotspot.end);
    assert!(hotspot.end <= "^(a+)+$".len());
    assert!(hotspot.text.contains('a'));
}

#[test]
fn real_world_safe_patterns() {
    for src in [
        r"^\d{4}-\d{2}-\d{2}$",
        r"^[a-zA-Z][a-zA-Z0-9_]{2,15}$",
        r"^#([A-Fa-f0-9]{6}|[A-Fa-f0-9]{3})$",
        r"^(foo|bar)+$",
        r"^a?b?c?$",
        r"^https?$",
    ] {
        let result = check(src);
        assert_eq!(
            result.status,
            Status::Safe,
            "false positive on {src}: {}",
            result.message
        );
    }
}

#[test]
fn nested_quantifier_variants_are_caught() {
    for src in ["^((a)+)+$", "^((a+)*)+$", "^(a+)+b$", "^(aa|b|aab)*$"] {
        let result = check(src);
        assert_eq!(
            result.status,
            Status::Vulnerable,
            "false negative on {src}: {}",
            result.message
        );
    }
}
