use serde_json::json;
use test_log::test;

use markmodel::{
    codec::compile,
    error::MarkModelError,
    linker::{
        guide::GuideTree,
        link,
        path::{leaf_paths, ModelPath},
        LinkTemplate,
    },
};

const SOURCE_SCHEMA: &str = "\
# Spectroscopy

### Experiment

- __name__
  - Type: string
  - Description: experiment name
- __series__
  - Type: Series
  - Description: measurement series
  - Multiple: True

### Series

- __label__
  - Type: string
  - Description: series label
- __scans__
  - Type: Scan
  - Description: individual scans
  - Multiple: True

### Scan

- __intensities__
  - Type: float
  - Description: intensity readings
  - Multiple: True
";

const TARGET_SCHEMA: &str = "\
# Archive

### Record

- __title__
  - Type: string
  - Description: record title
- __datasets__
  - Type: Dataset
  - Description: archived datasets
  - Multiple: True

### Dataset

- __tag__
  - Type: string
  - Description: dataset tag
- __traces__
  - Type: Trace
  - Description: archived traces
  - Multiple: True

### Trace

- __points__
  - Type: float
  - Description: archived readings
  - Multiple: True
";

fn models() -> (markmodel::model::DataModel, markmodel::model::DataModel) {
    (compile(SOURCE_SCHEMA).unwrap(), compile(TARGET_SCHEMA).unwrap())
}

#[test]
fn test_three_level_structure_preserving_link() {
    let (source, target) = models();
    let template = LinkTemplate::from_json(&json!({
        "__model__": "Experiment",
        "name": "title",
        "series/label": "datasets/tag",
        "series/scans/intensities": "datasets/traces/points"
    }))
    .unwrap();
    let instance = json!({
        "name": "uv-vis",
        "series": [
            {
                "label": "a",
                "scans": [
                    {"intensities": [0.1, 0.2]},
                    {"intensities": [0.3]}
                ]
            },
            {
                "label": "b",
                "scans": [
                    {"intensities": [0.4]}
                ]
            }
        ]
    });
    let linked = link(&instance, &source, &target, &template).unwrap();
    assert_eq!(
        linked,
        json!({
            "title": "uv-vis",
            "datasets": [
                {
                    "tag": "a",
                    "traces": [
                        {"points": [0.1, 0.2]},
                        {"points": [0.3]}
                    ]
                },
                {
                    "tag": "b",
                    "traces": [
                        {"points": [0.4]}
                    ]
                }
            ]
        })
    );
}

#[test]
fn test_flattening_keeps_distinct_increasing_indices() {
    // Collapsing three levels of nesting into one meta group must produce
    // one distinct index per source leaf, in source order.
    let flat_target = compile(
        "\
# Flat

### Record

- __points__
  - Type: float
  - Description: flattened readings
  - Multiple: True
",
    )
    .unwrap();
    let source = compile(SOURCE_SCHEMA).unwrap();
    let template = LinkTemplate::from_json(&json!({
        "__model__": "Experiment",
        "series/scans/intensities": "points"
    }))
    .unwrap();
    let entries = 5;
    let instance = json!({
        "series": [
            {"scans": [
                {"intensities": [1.0, 2.0]},
                {"intensities": [3.0]}
            ]},
            {"scans": [
                {"intensities": [4.0, 5.0]}
            ]}
        ]
    });
    let linked = link(&instance, &source, &flat_target, &template).unwrap();
    let points = linked["points"].as_array().unwrap();
    assert_eq!(points.len(), entries);
    assert_eq!(points, &vec![json!(1.0), json!(2.0), json!(3.0), json!(4.0), json!(5.0)]);
}

#[test]
fn test_expansion_fills_missing_indices_with_zero() {
    // The target nests one level deeper than the source: the extra leading
    // slot defaults to 0, keeping everything under the first dataset.
    let shallow_source = compile(
        "\
# Shallow

### Experiment

- __values__
  - Type: float
  - Description: readings
  - Multiple: True
",
    )
    .unwrap();
    let target = compile(TARGET_SCHEMA).unwrap();
    let template = LinkTemplate::from_json(&json!({
        "__model__": "Experiment",
        "values": "datasets/traces/points"
    }))
    .unwrap();
    let instance = json!({"values": [7.0, 8.0]});
    let linked = link(&instance, &shallow_source, &target, &template).unwrap();
    assert_eq!(
        linked,
        json!({
            "datasets": [
                {"traces": [{"points": [7.0, 8.0]}]}
            ]
        })
    );
}

#[test]
fn test_unmapped_leaves_are_ignored() {
    let (source, target) = models();
    let template = LinkTemplate::from_json(&json!({
        "__model__": "Experiment",
        "name": "title"
    }))
    .unwrap();
    let instance = json!({
        "name": "uv-vis",
        "series": [{"label": "a", "scans": []}]
    });
    let linked = link(&instance, &source, &target, &template).unwrap();
    assert_eq!(linked, json!({"title": "uv-vis"}));
}

#[test]
fn test_unresolvable_template_path_fails_whole_invocation() {
    let (source, target) = models();
    let template = LinkTemplate::from_json(&json!({
        "__model__": "Experiment",
        "name": "title",
        "series/nonexistent": "datasets/tag"
    }))
    .unwrap();
    let err = link(&json!({"name": "x"}), &source, &target, &template).unwrap_err();
    let MarkModelError::Linking { path, .. } = err else {
        panic!("expected a linking error");
    };
    assert_eq!(path, "series/nonexistent");
}

#[test]
fn test_guide_tree_and_instance_paths_agree() {
    let (source, _) = models();
    let tree = GuideTree::build(&source, "Experiment").unwrap();
    let metas = tree.meta_paths();
    let instance = json!({
        "name": "uv-vis",
        "series": [
            {"label": "a", "scans": [{"intensities": [0.1]}]}
        ]
    });
    for (path, _) in leaf_paths(&instance) {
        assert!(
            metas.contains(&path.meta()),
            "instance path {path} has no schema meta path"
        );
    }
    assert!(metas.contains(&ModelPath::from("series/scans/intensities")));
}
