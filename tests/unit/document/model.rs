use image::Rgba;

use super::*;

fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba(px))
}

#[test]
fn text_attrs_normalize_missing_values() {
    let attrs = TextAttrs {
        font: "  ".to_string(),
        size: f32::NAN,
        color: String::new(),
        align: TextAlign::Center,
        content: "Sale".to_string(),
    }
    .normalized();
    assert_eq!(attrs.font, "Arial");
    assert_eq!(attrs.size, 16.0);
    assert_eq!(attrs.color, "#000000");
    assert_eq!(attrs.align, TextAlign::Center);
    assert_eq!(attrs.content, "Sale");
}

#[test]
fn text_attrs_deserialize_with_defaults() {
    let attrs: TextAttrs = serde_json::from_str(r#"{"size": 42}"#).unwrap();
    assert_eq!(attrs.size, 42.0);
    assert_eq!(attrs.font, "Arial");
    assert_eq!(attrs.align, TextAlign::Left);
}

#[test]
fn layer_kind_labels_are_stable() {
    assert_eq!(LayerKind::Pixel.label(), "pixel");
    assert_eq!(LayerKind::Text(TextAttrs::default()).label(), "text");
    assert_eq!(LayerKind::Shape.label(), "shape");
    assert_eq!(LayerKind::Group.label(), "group");
    assert!(LayerKind::Group.is_group());
}

#[test]
fn hidden_leaf_renders_only_when_forced() {
    let node = DocNode::leaf("a", LayerKind::Pixel, 3, 4, solid(2, 2, [1, 2, 3, 255]))
        .with_visible(false);
    assert!(node.composite(false).is_none());
    let forced = node.composite(true).unwrap();
    assert_eq!((forced.left, forced.top), (3, 4));
    assert!(!node.visible);
}

#[test]
fn group_composite_covers_visible_children() {
    let group = DocNode::group(
        "g",
        vec![
            DocNode::leaf("a", LayerKind::Pixel, 10, 10, solid(5, 5, [255, 0, 0, 255])),
            DocNode::leaf("b", LayerKind::Shape, 20, 12, solid(4, 8, [0, 255, 0, 255])),
            DocNode::leaf("hidden", LayerKind::Pixel, 0, 0, solid(2, 2, [0, 0, 255, 255]))
                .with_visible(false),
        ],
    );
    let raster = group.composite(true).unwrap();
    assert_eq!(raster.bbox(), BBox::new(10, 10, 24, 20));
    assert_eq!(raster.image.get_pixel(0, 0).0, [255, 0, 0, 255]);
    assert_eq!(raster.image.get_pixel(10, 2).0, [0, 255, 0, 255]);
    assert_eq!(raster.image.get_pixel(6, 0).0, [0, 0, 0, 0]);
}

#[test]
fn empty_group_has_no_composite() {
    assert!(DocNode::group("empty", vec![]).composite(true).is_none());
}
