use image::Rgba;

use crate::apply::{ApplyWarningKind, SkipReason};

use super::*;

fn report() -> LayoutReport {
    LayoutReport {
        original_size: Canvas { width: 1200, height: 800 },
        target_size: Canvas { width: 800, height: 600 },
        layer_count: 2,
        oracle_attempts: 1,
        recovery_tier: RecoveryTier::Direct,
        layers: vec![
            AppliedLayer {
                id: 0,
                name: "bg".to_string(),
                outcome: LayerOutcome::Painted {
                    target: BBox::new(0, 0, 800, 600),
                    painted: Some(BBox::new(0, 0, 800, 600)),
                    resampled: true,
                },
            },
            AppliedLayer {
                id: 1,
                name: "gone".to_string(),
                outcome: LayerOutcome::Skipped {
                    reason: SkipReason::NoProposal,
                },
            },
        ],
        warnings: vec![ApplyWarning {
            layer_id: 1,
            kind: ApplyWarningKind::Skipped,
            message: "no proposal entry".to_string(),
        }],
        validation_warnings: vec![],
        states: vec![PipelineState::Idle, PipelineState::Done],
    }
}

#[test]
fn metadata_lists_painted_layers_only() {
    let meta = ResultMetadata::from_report(&report());
    assert_eq!(meta.layer_count, 2);
    assert_eq!(meta.layers.len(), 1);
    assert_eq!(meta.layers[0].new_coords, BBox::new(0, 0, 800, 600));

    let json = serde_json::to_value(&meta).unwrap();
    assert_eq!(json["target_size"]["width"], 800);
    assert_eq!(json["layers"][0]["new_coords"]["right"], 800);
}

#[test]
fn report_serializes_outcomes_and_states() {
    let json = serde_json::to_value(report()).unwrap();
    assert_eq!(json["recovery_tier"], "direct");
    assert_eq!(json["layers"][1]["outcome"]["outcome"], "skipped");
    assert_eq!(json["layers"][1]["outcome"]["reason"], "no_proposal");
    assert_eq!(json["warnings"][0]["kind"], "skipped");
    assert_eq!(json["states"][1], "done");
}

#[test]
fn png_round_trips_pixels() {
    let img = RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 4]));
    let png = encode_png(&img).unwrap();
    assert_eq!(&png[1..4], b"PNG");
    assert_eq!(image::load_from_memory(&png).unwrap().to_rgba8(), img);
}

#[test]
fn fs_store_writes_png_and_metadata() {
    let dir = std::env::temp_dir().join(format!("refit_store_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let store = FsOutputStore::new(&dir);
    let meta = ResultMetadata::from_report(&report());

    let a = store.store(b"png-a", &meta).unwrap();
    let b = store.store(b"png-b", &meta).unwrap();
    assert!(a.starts_with("resized_"));
    assert_ne!(a, b);

    assert_eq!(std::fs::read(store.png_path(&a)).unwrap(), b"png-a");
    let back: ResultMetadata =
        serde_json::from_slice(&std::fs::read(store.metadata_path(&b)).unwrap()).unwrap();
    assert_eq!(back, meta);
    let _ = std::fs::remove_dir_all(&dir);
}
