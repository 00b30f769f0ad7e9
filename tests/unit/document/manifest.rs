use std::io::Cursor;

use super::*;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("refit_manifest_{}_{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_png(path: &Path, img: &RgbaImage) {
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img.clone())
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    std::fs::write(path, buf).unwrap();
}

#[test]
fn fill_layers_and_groups_load_from_bytes() {
    let json = br##"{
      "width": 200, "height": 100,
      "layers": [
        { "name": "bg", "kind": "shape", "bbox": {"left":0,"top":0,"right":200,"bottom":100},
          "fill": [10, 20, 30, 255] },
        { "name": "grp", "kind": "group", "children": [
            { "name": "title", "kind": "text", "visible": false,
              "bbox": {"left":10,"top":10,"right":60,"bottom":30}, "fill": [255,255,255,255],
              "text": {"font": "Inter", "size": 24} }
        ]}
      ]
    }"##;
    let doc = ManifestLoader::new().open_bytes(json).unwrap();
    assert_eq!((doc.width, doc.height), (200, 100));
    assert_eq!(doc.roots.len(), 2);

    let bg = &doc.roots[0];
    assert_eq!(bg.kind, LayerKind::Shape);
    let px = bg.pixels.as_ref().unwrap();
    assert_eq!(px.dimensions(), (200, 100));
    assert_eq!(px.get_pixel(5, 5).0, [10, 20, 30, 255]);

    let grp = &doc.roots[1];
    assert!(grp.is_group());
    assert!(grp.pixels.is_none());
    let title = &grp.children()[0];
    assert!(!title.visible);
    let LayerKind::Text(attrs) = &title.kind else {
        panic!("expected text layer");
    };
    assert_eq!(attrs.font, "Inter");
    assert_eq!(attrs.size, 24.0);
    assert_eq!(attrs.color, "#000000");
}

#[test]
fn text_layer_without_attrs_gets_defaults() {
    let json = br#"{"width": 10, "height": 10, "layers": [{"name": "t", "kind": "text"}]}"#;
    let doc = ManifestLoader::new().open_bytes(json).unwrap();
    assert_eq!(doc.roots[0].kind, LayerKind::Text(TextAttrs::default()));
    assert!(doc.roots[0].pixels.is_none());
}

#[test]
fn source_layer_takes_size_from_raster_when_bbox_missing() {
    let dir = scratch_dir("source_size");
    write_png(
        &dir.join("logo.png"),
        &RgbaImage::from_pixel(7, 3, Rgba([1, 2, 3, 255])),
    );
    std::fs::write(
        dir.join("doc.json"),
        r#"{"width": 50, "height": 50, "layers": [
            {"name": "logo", "bbox": {"left": 4, "top": 5, "right": 4, "bottom": 5}, "source": "logo.png"}
        ]}"#,
    )
    .unwrap();

    let doc = ManifestLoader::new().open_path(&dir.join("doc.json")).unwrap();
    assert_eq!(doc.roots[0].bbox, BBox::new(4, 5, 11, 8));
}

#[test]
fn source_layer_is_fitted_to_explicit_bbox() {
    let dir = scratch_dir("source_fit");
    write_png(
        &dir.join("p.png"),
        &RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 255])),
    );
    let manifest = DocumentManifest {
        width: 40,
        height: 40,
        layers: vec![ManifestLayer {
            name: "p".to_string(),
            kind: ManifestKind::Pixel,
            visible: true,
            opacity: 1.0,
            bbox: BBox::new(0, 0, 16, 4),
            source: Some("p.png".to_string()),
            fill: None,
            text: None,
            children: vec![],
        }],
    };
    let doc = ManifestLoader::new().build(&manifest, &dir).unwrap();
    assert_eq!(doc.roots[0].pixels.as_ref().unwrap().dimensions(), (16, 4));
}

#[test]
fn missing_raster_is_a_document_error() {
    let json = br#"{"width": 10, "height": 10, "layers": [{"name": "x", "source": "nope.png"}]}"#;
    let err = ManifestLoader::with_assets_root(scratch_dir("missing"))
        .open_bytes(json)
        .unwrap_err();
    assert!(matches!(err, RefitError::Document(_)), "{err}");
    assert!(err.to_string().contains("layer 'x'"));
}

#[test]
fn malformed_manifest_and_empty_canvas_are_rejected() {
    let err = ManifestLoader::new().open_bytes(b"{not json").unwrap_err();
    assert!(matches!(err, RefitError::Document(_)));

    let err = ManifestLoader::new()
        .open_bytes(br#"{"width": 0, "height": 10, "layers": []}"#)
        .unwrap_err();
    assert!(matches!(err, RefitError::Document(_)));
}

#[test]
fn opacity_is_clamped() {
    let json = br#"{"width": 10, "height": 10, "layers": [{"name": "x", "opacity": 3.5}]}"#;
    let doc = ManifestLoader::new().open_bytes(json).unwrap();
    assert_eq!(doc.roots[0].opacity, 1.0);
}

#[test]
fn inverted_fill_bbox_reaches_the_layer_table_ordered() {
    let json = br#"{"width": 100, "height": 100, "layers": [
        {"name": "x", "kind": "shape", "bbox": {"left": 50, "top": 40, "right": 10, "bottom": 5},
         "fill": [1, 2, 3, 255]}
    ]}"#;
    let doc = ManifestLoader::new().open_bytes(json).unwrap();
    assert!(doc.roots[0].pixels.is_none());

    let ex = crate::flatten::flatten(&doc).unwrap();
    assert_eq!(ex.snapshot.layers[0].bbox, BBox::new(50, 40, 50, 40));
    let table = crate::prompt::format_layer_table(&ex.snapshot.layers);
    assert!(table.contains("(50, 40, 50, 40)"), "{table}");
    assert!(table.lines().nth(2).is_some_and(|row| row.ends_with("0x0")));
}
