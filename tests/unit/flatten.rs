use image::Rgba;

use super::*;
use crate::document::model::TextAttrs;

fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba(px))
}

fn nested_doc() -> LoadedDocument {
    LoadedDocument {
        width: 100,
        height: 80,
        roots: vec![
            DocNode::leaf("bg", LayerKind::Pixel, 0, 0, solid(100, 80, [9, 9, 9, 255])),
            DocNode::group(
                "hero",
                vec![
                    DocNode::leaf("product", LayerKind::Pixel, 10, 10, solid(20, 20, [200, 0, 0, 255])),
                    DocNode::group(
                        "copy",
                        vec![DocNode::leaf(
                            "title",
                            LayerKind::Text(TextAttrs {
                                font: String::new(),
                                size: 0.0,
                                ..TextAttrs::default()
                            }),
                            40,
                            12,
                            solid(30, 8, [255, 255, 255, 255]),
                        )],
                    ),
                ],
            ),
            DocNode::leaf("badge", LayerKind::Shape, 90, 70, solid(20, 20, [0, 0, 255, 255]))
                .with_visible(false),
        ],
    }
}

#[test]
fn ids_are_preorder_and_parents_precede_children() {
    let ex = flatten(&nested_doc()).unwrap();
    let names: Vec<_> = ex.snapshot.layers.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, ["bg", "hero", "product", "copy", "title", "badge"]);

    for (i, layer) in ex.snapshot.layers.iter().enumerate() {
        assert_eq!(layer.id as usize, i);
        if let Some(parent) = layer.parent_id {
            assert!(parent < layer.id);
        }
    }
    let levels: Vec<_> = ex.snapshot.layers.iter().map(|l| l.level).collect();
    assert_eq!(levels, [0, 0, 1, 1, 2, 0]);
    assert_eq!(ex.snapshot.layer(4).unwrap().parent_id, Some(3));
    assert_eq!(ex.snapshot.layer(2).unwrap().parent_id, Some(1));
    assert!(ex.snapshot.layer(6).is_none());
}

#[test]
fn group_bbox_is_backfilled_from_composite() {
    let ex = flatten(&nested_doc()).unwrap();
    let hero = ex.snapshot.layer(1).unwrap();
    assert_eq!(hero.bbox, BBox::new(10, 10, 70, 30));
    assert!(ex.bitmaps.get(1).is_none());

    let copy = ex.snapshot.layer(3).unwrap();
    assert_eq!(copy.bbox, BBox::new(40, 12, 70, 20));
}

#[test]
fn bitmaps_are_cropped_to_clamped_bbox() {
    let ex = flatten(&nested_doc()).unwrap();
    let badge = ex.snapshot.layer(5).unwrap();
    assert_eq!(badge.bbox, BBox::new(90, 70, 100, 80));
    assert!(!badge.visible);

    // Hidden layers still get their own pixels.
    let bitmap = ex.bitmaps.get(5).unwrap();
    assert_eq!(bitmap.dimensions(), (10, 10));
    assert_eq!(bitmap.get_pixel(0, 0).0, [0, 0, 255, 255]);

    assert_eq!(ex.bitmaps.get(0).unwrap().dimensions(), (100, 80));
    assert_eq!(ex.bitmaps.painted_count(), 4);
}

#[test]
fn uncropped_bitmaps_share_the_document_raster() {
    let doc = nested_doc();
    let ex = flatten(&doc).unwrap();
    let original = doc.roots[0].pixels.as_ref().unwrap();
    assert!(Arc::ptr_eq(original, ex.bitmaps.get(0).unwrap()));
}

#[test]
fn text_attrs_are_normalized() {
    let ex = flatten(&nested_doc()).unwrap();
    let LayerKind::Text(attrs) = &ex.snapshot.layer(4).unwrap().kind else {
        panic!("expected text layer");
    };
    assert_eq!(attrs.font, "Arial");
    assert_eq!(attrs.size, 16.0);
}

#[test]
fn fully_offcanvas_layer_is_degenerate_without_bitmap() {
    let doc = LoadedDocument {
        width: 10,
        height: 10,
        roots: vec![DocNode::leaf("gone", LayerKind::Pixel, 50, 50, solid(4, 4, [1, 1, 1, 255]))],
    };
    let ex = flatten(&doc).unwrap();
    assert!(ex.snapshot.layers[0].bbox.is_degenerate());
    assert!(ex.bitmaps.get(0).is_none());
}

#[test]
fn nested_groups_track_depth() {
    let mut node = DocNode::leaf("leaf", LayerKind::Pixel, 1, 1, solid(2, 2, [1, 1, 1, 255]));
    for i in 0..64 {
        node = DocNode::group(format!("g{i}"), vec![node]);
    }
    let doc = LoadedDocument {
        width: 4,
        height: 4,
        roots: vec![node],
    };
    let ex = flatten(&doc).unwrap();
    assert_eq!(ex.snapshot.layers.len(), 65);
    let leaf = ex.snapshot.layers.last().unwrap();
    assert_eq!((leaf.level, leaf.parent_id), (64, Some(63)));
    assert!(ex.snapshot.layers.iter().all(|l| l.bbox == BBox::new(1, 1, 3, 3)));
}

#[test]
fn empty_canvas_is_rejected() {
    let doc = LoadedDocument {
        width: 0,
        height: 10,
        roots: vec![],
    };
    assert!(flatten(&doc).is_err());
}

#[test]
fn leaves_under_hidden_groups_are_not_visible() {
    let doc = LoadedDocument {
        width: 20,
        height: 20,
        roots: vec![
            DocNode::group(
                "hidden",
                vec![DocNode::group(
                    "inner",
                    vec![DocNode::leaf("red", LayerKind::Pixel, 5, 5, solid(4, 4, [255, 0, 0, 255]))],
                )],
            )
            .with_visible(false),
            DocNode::group(
                "shown",
                vec![DocNode::leaf("green", LayerKind::Pixel, 0, 0, solid(4, 4, [0, 255, 0, 255]))],
            ),
        ],
    };
    let ex = flatten(&doc).unwrap();
    let visible: Vec<_> = ex
        .snapshot
        .layers
        .iter()
        .map(|l| (l.name.as_str(), l.visible))
        .collect();
    assert_eq!(
        visible,
        [
            ("hidden", false),
            ("inner", false),
            ("red", false),
            ("shown", true),
            ("green", true),
        ]
    );
    // Hidden layers keep their pixels and a back-filled box for the detection image.
    assert!(ex.bitmaps.get(2).is_some());
    assert_eq!(ex.snapshot.layer(0).unwrap().bbox, BBox::new(5, 5, 9, 9));
}

#[test]
fn inverted_bbox_without_pixels_is_ordered() {
    let mut node = DocNode::group("empty", Vec::new());
    node.kind = LayerKind::Shape;
    node.bbox = BBox::new(50, 40, 10, 5);
    let doc = LoadedDocument {
        width: 100,
        height: 100,
        roots: vec![node],
    };
    let ex = flatten(&doc).unwrap();
    let bbox = ex.snapshot.layers[0].bbox;
    assert!(bbox.right >= bbox.left && bbox.bottom >= bbox.top, "{bbox}");
    assert!(bbox.is_degenerate());
    assert!(ex.bitmaps.get(0).is_none());
}
