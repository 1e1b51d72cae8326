#![allow(dead_code)]

use std::collections::BTreeMap;

use caseiter::table::FileOverrides;
use caseiter::{CaseRecord, FileRole};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn arb_initials() -> impl Strategy<Value = String> {
    "[A-Za-z]{1,3}(-[A-Za-z0-9]{1,2})?"
}

pub fn arb_segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}"
}

/// Mask names, including some that resolve to the same file as another.
pub fn arb_mask_name() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => arb_segment(),
        1 => prop::sample::select(vec!["mask", "Mask", "liver seg", "liver_seg"])
            .prop_map(str::to_string),
    ]
}

pub fn arb_role() -> impl Strategy<Value = FileRole> {
    prop_oneof![
        Just(FileRole::Image),
        Just(FileRole::Mask),
        arb_segment().prop_map(FileRole::ExtraImage),
        arb_segment().prop_map(FileRole::ExtraMask),
    ]
}

pub fn arb_record() -> impl Strategy<Value = CaseRecord> {
    (
        0usize..500,
        "[a-z0-9_]{1,10}(/[a-z0-9_]{1,10}){0,2}",
        proptest::option::of("P[0-9]{3}"),
        proptest::option::of("[a-z]{1,8}\\.nii\\.gz"),
    )
        .prop_map(|(index, path, label, image)| CaseRecord {
            index,
            path,
            label,
            overrides: FileOverrides {
                image,
                mask: None,
                extra_images: BTreeMap::new(),
                extra_masks: BTreeMap::new(),
            },
        })
}

/// Navigation steps a reader can take while a batch runs.
#[derive(Clone, Debug)]
pub enum Step {
    Next,
    Previous,
    Edit,
    NewMask(String),
}

pub fn arb_steps(max: usize) -> impl Strategy<Value = Vec<Step>> {
    proptest::collection::vec(
        prop_oneof![
            3 => Just(Step::Next),
            2 => Just(Step::Previous),
            2 => Just(Step::Edit),
            1 => arb_mask_name().prop_map(Step::NewMask),
        ],
        0..max,
    )
}
