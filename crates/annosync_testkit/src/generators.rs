//! Property-based test generators using proptest.
//!
//! Provides strategies for generating annotations and reply forests that
//! keep the hierarchy invariants (references oldest first, parents created
//! before their replies).

use crate::fixtures::{base_time, AnnotationBuilder};
use annosync_model::Annotation;
use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use proptest::sample::Index;

/// Strategy for timestamps within a year after the fixture base time.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..366 * 24 * 3600).prop_map(|secs| base_time() + Duration::seconds(secs))
}

/// Strategy for annotation bodies, with and without the `name:: content` split.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ]{1,40}",
        ("[a-zA-Z]{1,12}", "[a-zA-Z ]{0,30}").prop_map(|(name, body)| format!("{name}:: {body}")),
    ]
}

/// Strategy for a single top-level annotation on `uri`.
pub fn annotation_strategy(uri: &'static str) -> impl Strategy<Value = Annotation> {
    ("[a-z0-9]{8}", text_strategy(), timestamp_strategy()).prop_map(move |(id, text, created)| {
        AnnotationBuilder::new(&id)
            .uri(uri)
            .text(&text)
            .created(created)
            .build()
    })
}

/// Strategy for a reply forest of up to `max_size` annotations on `uri`,
/// returned in random order.
///
/// Annotation `i` is named `a{i}` and created `i` minutes after the base
/// time; when it is a reply, its parent is one of `a0..a{i-1}`.
pub fn forest_strategy(uri: &'static str, max_size: usize) -> impl Strategy<Value = Vec<Annotation>> {
    (1..=max_size.max(1))
        .prop_flat_map(|size| {
            (
                prop::collection::vec(any::<bool>(), size),
                prop::collection::vec(any::<Index>(), size),
            )
        })
        .prop_flat_map(move |(is_reply, parents)| {
            let mut forest: Vec<Annotation> = Vec::with_capacity(is_reply.len());
            for (i, (reply, parent)) in is_reply.iter().zip(&parents).enumerate() {
                let builder = AnnotationBuilder::new(&format!("a{i}"))
                    .uri(uri)
                    .created_minutes(i as i64);
                let annotation = if *reply && i > 0 {
                    builder.reply_to(&forest[parent.index(i)]).build()
                } else {
                    builder.build()
                };
                forest.push(annotation);
            }
            Just(forest).prop_shuffle()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    proptest! {
        #[test]
        fn forests_reference_earlier_annotations(forest in forest_strategy("https://example.com", 12)) {
            let ids: HashSet<_> = forest.iter().map(|a| a.id.clone()).collect();
            for annotation in &forest {
                for ancestor in &annotation.references {
                    prop_assert!(ids.contains(ancestor));
                }
                if let Some(parent_id) = annotation.parent_id() {
                    let parent = forest.iter().find(|a| &a.id == parent_id).unwrap();
                    prop_assert!(parent.created < annotation.created);
                    prop_assert_eq!(parent.depth() + 1, annotation.depth());
                }
            }
        }

        #[test]
        fn generated_text_is_never_empty(text in text_strategy()) {
            prop_assert!(!text.is_empty());
        }
    }
}
