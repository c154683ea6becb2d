//! Property-based tests for job resolution and the action log.

use fl::actions::{ActionEntry, ActionKind};
use fl::resolve::{SupportedExtensions, resolve_jobs, synthesize_output};
use proptest::prelude::*;
use std::path::PathBuf;

const RUN: SupportedExtensions = SupportedExtensions::new(&["fl", "flc"], &["png", "bmp"]);

fn stem_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,12}"
}

fn dir_strategy() -> impl Strategy<Value = PathBuf> {
    prop::collection::vec("[a-z]{1,8}", 0..4)
        .prop_map(|parts| PathBuf::from("/").join(parts.join("/")))
}

fn kind_strategy() -> impl Strategy<Value = ActionKind> {
    prop::sample::select(ActionKind::ALL.to_vec())
}

proptest! {
    /// Synthesized outputs stay next to the input and keep its stem.
    #[test]
    fn synthesized_output_is_sibling(
        dir in dir_strategy(),
        stem in stem_strategy(),
        input_ext in prop::sample::select(vec!["fl", "flc"]),
        output_ext in prop::sample::select(vec!["png", "bmp", "flc", ""]),
    ) {
        let input = dir.join(format!("{stem}.{input_ext}"));
        let output = synthesize_output(&input, output_ext);

        prop_assert_eq!(output.parent(), input.parent());
        prop_assert_eq!(output.file_stem(), input.file_stem());
        if output_ext.is_empty() {
            prop_assert!(output.extension().is_none());
        } else {
            prop_assert_eq!(output.extension().unwrap(), output_ext);
        }
    }

    /// With fewer outputs than inputs, the remaining jobs get the first
    /// output extension.
    #[test]
    fn missing_outputs_use_first_output_extension(
        stems in prop::collection::vec(stem_strategy(), 1..8),
        given in 0usize..8,
    ) {
        let inputs: Vec<PathBuf> = stems.iter().map(|s| PathBuf::from(format!("/w/{s}.fl"))).collect();
        let given = given.min(inputs.len());
        let outputs: Vec<PathBuf> = (0..given).map(|i| PathBuf::from(format!("/out/{i}.bmp"))).collect();

        let jobs = resolve_jobs(&inputs, &outputs, &RUN, false).unwrap();
        prop_assert_eq!(jobs.len(), inputs.len());
        for (i, job) in jobs.iter().enumerate() {
            if i < given {
                prop_assert_eq!(&job.output, &outputs[i]);
            } else {
                prop_assert_eq!(&job.output, &PathBuf::from(format!("/w/{}.png", stems[i])));
            }
        }
    }

    /// One bad input anywhere rejects the whole list.
    #[test]
    fn any_unsupported_input_rejects_batch(
        stems in prop::collection::vec(stem_strategy(), 1..8),
        bad_index in 0usize..8,
        bad_ext in "(txt|png|json|c)",
    ) {
        let mut inputs: Vec<PathBuf> = stems.iter().map(|s| PathBuf::from(format!("/w/{s}.fl"))).collect();
        let bad_index = bad_index % inputs.len();
        inputs[bad_index].set_extension(&bad_ext);

        prop_assert!(resolve_jobs(&inputs, &[], &RUN, false).is_err());
    }

    /// Action lines parse back to the entry that produced them.
    #[test]
    fn action_lines_parse_back(kind in kind_strategy(), argument in "[a-zA-Z0-9:/._-]{1,40}") {
        let entry = ActionEntry::new(kind, argument);
        let line = entry.to_string();
        prop_assert_eq!(line.parse::<ActionEntry>().unwrap(), entry);
    }
}
