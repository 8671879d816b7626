//! Property tests for search scoring and ranking

use proptest::prelude::*;
use vaultdex::domain::{MatchField, Resource, SearchHit, SecretMeta};
use vaultdex::search::{self, score_term, EXACT_SCORE, FUZZY_MAX_SCORE, PREFIX_SCORE, SUBSTRING_SCORE};

prop_compose! {
    fn arb_name()(name in "[a-zA-Z0-9-]{1,16}") -> String {
        name
    }
}

prop_compose! {
    fn arb_hit()(
        vault in "kv-[a-c]",
        name in arb_name(),
        score in 1u8..=100,
    ) -> SearchHit {
        SearchHit::new(vault, SecretMeta::named(name).to_meta(), score, MatchField::Name)
    }
}

proptest! {
    #[test]
    fn test_scores_stay_in_range(term in arb_name(), candidate in arb_name()) {
        let score = score_term(&term, &candidate);
        prop_assert!(score <= EXACT_SCORE);
    }

    #[test]
    fn test_exact_match_scores_highest(name in arb_name()) {
        prop_assert_eq!(score_term(&name, &name), EXACT_SCORE);
        prop_assert_eq!(score_term(&name.to_uppercase(), &name.to_lowercase()), EXACT_SCORE);
    }

    #[test]
    fn test_ladder_tiers(term in "[a-z]{2,6}", prefix in "[a-z]{1,4}", suffix in "[a-z]{1,4}") {
        prop_assert_eq!(score_term(&term, &format!("{}{}", term, suffix)), PREFIX_SCORE);

        let inner = format!("{}{}{}", prefix, term, suffix);
        let expected = if inner.starts_with(&term) { PREFIX_SCORE } else { SUBSTRING_SCORE };
        prop_assert_eq!(score_term(&term, &inner), expected);
    }

    #[test]
    fn test_fuzzy_never_reaches_substring_tier(term in "[a-z]{3,8}", candidate in "[a-z]{3,16}") {
        let score = score_term(&term, &candidate);
        if !candidate.contains(&term) {
            prop_assert!(score <= FUZZY_MAX_SCORE);
        }
    }

    #[test]
    fn test_blank_terms_match_nothing(spaces in "[ \t]{0,4}", candidate in arb_name()) {
        prop_assert_eq!(score_term(&spaces, &candidate), 0);
    }

    #[test]
    fn test_rank_is_sorted_and_order_independent(mut hits in prop::collection::vec(arb_hit(), 0..24)) {
        let mut reversed: Vec<SearchHit> = hits.iter().rev().cloned().collect();
        search::rank(&mut hits);
        search::rank(&mut reversed);

        for pair in hits.windows(2) {
            prop_assert!(search::compare_hits(&pair[0], &pair[1]).is_le());
        }
        let order = |hits: &[SearchHit]| -> Vec<(u8, String, String)> {
            hits.iter().map(|h| (h.score, h.name.clone(), h.vault_identifier.clone())).collect()
        };
        prop_assert_eq!(order(&hits), order(&reversed));
    }
}
