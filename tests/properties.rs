//! Property tests for splice offsets and unsafe-context immunity.

use field_mapper_converter::context::{ContextClassifier, SourceIndex};
use field_mapper_converter::decision::{
    ComponentScores, DecisionEngine, LearnedLibrary, APPROVE_THRESHOLD,
};
use field_mapper_converter::{apply_auto_conversions, Accessor, Action, FieldRegistry, PatternScanner};
use proptest::prelude::*;
use std::path::Path;

fn registry() -> FieldRegistry {
    FieldRegistry::from_pairs([("legacyField", "CANON_KEY")], Accessor::new("lookup", "lookup"))
}

proptest! {
    #[test]
    fn descending_splice_replaces_exactly_the_sites(
        fillers in prop::collection::vec("[a-z0-9 =;]{0,12}", 1..8)
    ) {
        let scanner = PatternScanner::new(registry()).unwrap();
        let source = fillers.join("\nx.legacyField;\n");
        let expected_sites = fillers.len() - 1;

        let scan = scanner.scan(&source);
        prop_assert_eq!(scan.auto_convertible.len(), expected_sites);

        let applied = apply_auto_conversions(&source, &scan.auto_convertible).unwrap();
        prop_assert_eq!(applied.changes.len(), expected_sites);
        prop_assert_eq!(applied.converted, fillers.join("\nx[lookup('CANON_KEY')];\n"));
    }

    #[test]
    fn unsafe_context_can_never_reach_approval(
        context in 0.0f64..=0.10,
        pattern in 0.0f64..=1.0,
        complexity in 0.0f64..=1.0,
        risk in 0.0f64..=1.0,
    ) {
        let scores = ComponentScores { context, pattern, complexity, risk };
        prop_assert!(scores.total() < APPROVE_THRESHOLD);
    }

    #[test]
    fn sites_in_comments_and_strings_are_never_approved(
        prefix in "[a-z =;]{0,10}",
        inner in "[a-z ]{0,10}",
    ) {
        let registry = registry();
        let classifier = ContextClassifier::new(registry.accessor()).unwrap();
        let engine = DecisionEngine::new(LearnedLibrary::with_defaults(&registry).unwrap());
        let scanner = PatternScanner::new(registry).unwrap();

        let source = format!(
            "{prefix}\n// {inner} x.legacyField = 1;\n/* o.legacyField */\nconst s = \"a.legacyField\";\n"
        );
        let index = SourceIndex::new(&source);
        let file = classifier.analyze_file(&index, Path::new("p.js"));
        let sites = scanner
            .scan(&source)
            .sites()
            .into_iter()
            .map(|site| (site.clone(), classifier.analyze_position(&index, site.offset)))
            .collect::<Vec<_>>();
        prop_assert!(!sites.is_empty());

        let review = engine.review_violations(sites, &file);
        for reviewed in review.all() {
            prop_assert!(!reviewed.context.is_safe_to_modify);
            prop_assert_eq!(reviewed.decision.action, Action::Reject);
        }
    }
}
