use super::*;
use crate::graph::node::{Port, PropValue};

struct Scene {
    img: Image,
    bg: DrawableId,
    fs: DrawableId,
}

/// A 100x50 layer at (10, 20) and a 40x40 floating candidate at (30, 5).
fn scene(opts: ImageOpts) -> Scene {
    let mut img = Image::new(200, 100, opts);
    let bg = img
        .add_drawable("bg", 10, 20, BufferRef::new_rgba(100, 50))
        .unwrap();
    let fs = img
        .add_drawable("fs", 30, 5, BufferRef::new_rgba(40, 40))
        .unwrap();
    img.add_layer(bg, 0).unwrap();
    Scene { img, bg, fs }
}

fn overlay(img: &Image, id: DrawableId) -> &Overlay {
    img.drawable(id).unwrap().overlay().unwrap()
}

#[test]
fn overlay_waits_for_the_source_node() {
    let Scene { mut img, bg, fs } = scene(ImageOpts::default());
    img.attach_floating(bg, fs).unwrap();
    assert_eq!(img.drawable(bg).unwrap().floating_selection(), Some(fs));
    assert!(img.drawable(bg).unwrap().overlay().is_none());
    assert!(img.filters(bg).unwrap().is_empty());

    img.source_node(bg).unwrap();
    let o = overlay(&img, bg);
    let stage = img.stages().get(o.stage()).unwrap();
    assert_eq!(stage.name(), "Floating Selection");
    assert_eq!(img.filters(bg).unwrap().first(), Some(o.stage()));
    assert!(stage.is_base());
}

#[test]
fn attach_and_detach_contracts() {
    let Scene { mut img, bg, fs } = scene(ImageOpts::default());
    let loose = img
        .add_drawable("loose", 0, 0, BufferRef::new_rgba(4, 4))
        .unwrap();

    let contract = |r: ComposeResult<()>| matches!(r, Err(ComposeError::Contract(_)));
    assert!(contract(img.attach_floating(bg, bg)));
    assert!(contract(img.attach_floating(loose, fs)));
    assert!(contract(img.detach_floating(bg)));
    assert!(matches!(
        img.attach_floating(bg, DrawableId(99)),
        Err(ComposeError::InvalidArgument(_))
    ));

    img.attach_floating(bg, fs).unwrap();
    assert!(contract(img.attach_floating(bg, loose)));
    img.add_layer(loose, 0).unwrap();
    assert!(contract(img.attach_floating(loose, fs)));

    img.detach_floating(bg).unwrap();
    assert!(contract(img.detach_floating(bg)));
    assert_eq!(img.floating_layer(), None);
}

#[test]
fn overlay_geometry_follows_both_origins() {
    let Scene { mut img, bg, fs } = scene(ImageOpts::default());
    img.source_node(bg).unwrap();
    img.attach_floating(bg, fs).unwrap();

    let o = overlay(&img, bg);
    assert_eq!(o.applicator().apply_offset(), (20, -15));
    assert_eq!(
        img.graph().property(o.crop_node(), "x"),
        Some(&PropValue::Float(-20.0))
    );

    img.set_offset(fs, 50, 60).unwrap();
    let o = overlay(&img, bg);
    assert_eq!(o.applicator().apply_offset(), (40, 40));
    assert_eq!(
        img.graph().property(o.crop_node(), "x"),
        Some(&PropValue::Float(-40.0))
    );
    assert_eq!(
        img.graph().property(o.crop_node(), "y"),
        Some(&PropValue::Float(-40.0))
    );
    assert_eq!(
        img.graph().property(o.crop_node(), "width"),
        Some(&PropValue::Float(100.0))
    );

    img.set_offset(bg, 0, 0).unwrap();
    assert_eq!(overlay(&img, bg).applicator().apply_offset(), (50, 60));
}

#[test]
fn blend_parameters_come_from_the_floating_layer() {
    let Scene { mut img, bg, fs } = scene(ImageOpts::default());
    img.source_node(bg).unwrap();
    img.attach_floating(bg, fs).unwrap();

    img.set_mode(fs, BlendMode::Screen).unwrap();
    img.set_opacity(fs, 0.5).unwrap();
    let app = overlay(&img, bg).applicator();
    assert_eq!(app.mode(), BlendMode::Screen);
    assert_eq!(app.opacity(), 0.5);

    // The host's own blend settings never reach the overlay.
    img.set_mode(bg, BlendMode::Multiply).unwrap();
    assert_eq!(overlay(&img, bg).applicator().mode(), BlendMode::Screen);
}

#[test]
fn deferred_events_wait_for_dispatch() {
    let opts = ImageOpts {
        deferred_dispatch: true,
        ..ImageOpts::default()
    };
    let Scene { mut img, bg, fs } = scene(opts);
    img.source_node(bg).unwrap();
    img.attach_floating(bg, fs).unwrap();

    img.set_offset(fs, 50, 60).unwrap();
    img.set_opacity(fs, 0.25).unwrap();
    img.set_opacity(bg, 0.75).unwrap();
    assert_eq!(
        img.pending_events().collect::<Vec<_>>(),
        vec![ImageEvent::FloatingOffset, ImageEvent::FloatingOpacity]
    );
    assert_eq!(overlay(&img, bg).applicator().apply_offset(), (20, -15));

    assert_eq!(img.dispatch_events().unwrap(), 2);
    assert_eq!(img.pending_events().count(), 0);
    let app = overlay(&img, bg).applicator();
    assert_eq!(app.apply_offset(), (40, 40));
    assert_eq!(app.opacity(), 0.25);
}

#[test]
fn repeated_events_converge_on_one_state() {
    let opts = ImageOpts {
        deferred_dispatch: true,
        ..ImageOpts::default()
    };
    let Scene { mut img, bg, fs } = scene(opts);
    let source = img.source_node(bg).unwrap();
    img.attach_floating(bg, fs).unwrap();
    img.dispatch_events().unwrap();

    img.set_mode(fs, BlendMode::Darken).unwrap();
    img.dispatch_events().unwrap();
    let once = img.graph().snapshot(source).fingerprint();

    img.set_visible(fs, false).unwrap();
    img.set_visible(fs, true).unwrap();
    img.set_active_channels(ChannelMask::RGB).unwrap();
    img.set_active_channels(ChannelMask::all()).unwrap();
    assert_eq!(img.dispatch_events().unwrap(), 4);
    assert_eq!(img.graph().snapshot(source).fingerprint(), once);
    let app = overlay(&img, bg).applicator();
    assert_eq!(app.mode(), BlendMode::Darken);
    assert_eq!(app.affect(), ChannelMask::all());
    assert_eq!(img.filters(bg).unwrap().count(), 1);
}

#[test]
fn selection_mask_reaches_the_applicator() {
    let Scene { mut img, bg, fs } = scene(ImageOpts::default());
    img.source_node(bg).unwrap();
    img.attach_floating(bg, fs).unwrap();

    let empty = BufferRef::new_gray(200, 100);
    img.set_selection(Some(empty)).unwrap();
    assert!(img.is_selection_empty());
    assert_eq!(overlay(&img, bg).applicator().mask(), None);

    let mut pixels = image::GrayImage::new(200, 100);
    pixels.put_pixel(15, 25, image::Luma([255]));
    let mask = BufferRef::Gray(std::sync::Arc::new(pixels));
    img.set_selection(Some(mask.clone())).unwrap();
    let app = overlay(&img, bg).applicator();
    assert_eq!(app.mask(), Some(&mask));
    assert_eq!(app.mask_offset(), (-10, -20));

    img.set_selection(None).unwrap();
    assert_eq!(overlay(&img, bg).applicator().mask(), None);

    assert!(matches!(
        img.set_selection(Some(BufferRef::new_gray(10, 10))),
        Err(ComposeError::InvalidArgument(_))
    ));
    assert!(matches!(
        img.set_selection(Some(BufferRef::new_rgba(200, 100))),
        Err(ComposeError::InvalidArgument(_))
    ));
}

#[test]
fn affected_channels_drop_alpha_for_alpha_less_hosts() {
    let mut img = Image::new(64, 64, ImageOpts::default());
    let bg = img
        .add_drawable("bg", 0, 0, BufferRef::new_rgb(64, 64))
        .unwrap();
    let fs = img
        .add_drawable("fs", 0, 0, BufferRef::new_rgba(8, 8))
        .unwrap();
    img.add_layer(bg, 0).unwrap();
    img.source_node(bg).unwrap();
    img.attach_floating(bg, fs).unwrap();
    assert_eq!(overlay(&img, bg).applicator().affect(), ChannelMask::RGB);

    img.set_active_channels(ChannelMask::RED | ChannelMask::ALPHA)
        .unwrap();
    assert_eq!(overlay(&img, bg).applicator().affect(), ChannelMask::RED);
}

#[test]
fn floating_damage_lands_on_the_host_in_host_coordinates() {
    let Scene { mut img, bg, fs } = scene(ImageOpts::default());
    let source = img.source_node(bg).unwrap();
    img.take_invalidations();

    img.attach_floating(bg, fs).unwrap();
    let inv = img.take_invalidations();
    assert_eq!(
        inv,
        vec![Invalidation {
            node: source,
            rect: PixelRect::new(20, 0, 40, 25),
        }]
    );

    img.update(fs, PixelRect::new(0, 0, 5, 5)).unwrap();
    assert!(
        img.take_invalidations()
            .iter()
            .all(|i| i.node != source),
        "damage outside the host must not propagate"
    );

    img.update(fs, PixelRect::new(10, 20, 5, 5)).unwrap();
    let host: Vec<_> = img
        .take_invalidations()
        .into_iter()
        .filter(|i| i.node == source)
        .collect();
    assert_eq!(host[0].rect, PixelRect::new(30, 5, 5, 5));
}

#[test]
fn damage_recording_can_be_disabled() {
    let opts = ImageOpts {
        record_damage: false,
        ..ImageOpts::default()
    };
    let Scene { mut img, bg, fs } = scene(opts);
    img.source_node(bg).unwrap();
    img.attach_floating(bg, fs).unwrap();
    assert!(img.take_invalidations().is_empty());
}

#[test]
fn overlay_stage_is_only_removed_by_detach() {
    let Scene { mut img, bg, fs } = scene(ImageOpts::default());
    img.source_node(bg).unwrap();
    img.attach_floating(bg, fs).unwrap();
    let stage = overlay(&img, bg).stage();
    assert!(matches!(
        img.remove_filter(bg, stage),
        Err(ComposeError::Contract(_))
    ));

    img.detach_floating(bg).unwrap();
    assert!(img.stages().get(stage).is_none());
    assert!(img.filters(bg).unwrap().is_empty());
}

#[test]
fn layer_built_during_attach_leaves_the_borrowed_source_alone() {
    let Scene { mut img, bg, fs } = scene(ImageOpts::default());
    img.add_layer(fs, 0).unwrap();
    img.source_node(bg).unwrap();
    img.attach_floating(bg, fs).unwrap();

    let fs_layer = img.layer_node(fs).unwrap();
    let d = img.drawable(fs).unwrap();
    let fs_source = d.source_node().unwrap();
    let offset = d.offset_node().unwrap();
    assert_eq!(
        img.graph().parent(fs_source),
        Some(overlay(&img, bg).node())
    );
    assert_eq!(img.graph().source_of(offset, Port::Input), None);

    img.detach_floating(bg).unwrap();
    assert_eq!(img.graph().parent(fs_source), Some(fs_layer));
    assert_eq!(img.graph().source_of(offset, Port::Input), Some(fs_source));
}

#[test]
fn projection_graph_tracks_the_layer_stack() {
    let Scene { mut img, bg, fs } = scene(ImageOpts::default());
    let meta = img.get_graph().unwrap();
    assert_eq!(img.get_graph().unwrap(), meta);
    let snap = img.graph().snapshot(meta);
    assert!(snap.has_edge("image:input", "bg", Port::Input));
    assert!(snap.has_edge("bg", "image:output", Port::Input));

    img.add_layer(fs, 0).unwrap();
    let snap = img.graph().snapshot(meta);
    assert!(snap.has_edge("bg", "fs", Port::Input));
    assert!(snap.has_edge("fs", "image:output", Port::Input));

    img.reorder_layer(fs, 1).unwrap();
    let snap = img.graph().snapshot(meta);
    assert!(snap.has_edge("image:input", "fs", Port::Input));
    assert!(snap.has_edge("bg", "image:output", Port::Input));

    img.remove_layer(fs).unwrap();
    let snap = img.graph().snapshot(meta);
    assert!(snap.has_edge("image:input", "bg", Port::Input));
    assert!(img.drawable(fs).unwrap().layer_node().is_some());
}

#[test]
fn remove_drawable_detaches_and_frees() {
    let Scene { mut img, bg, fs } = scene(ImageOpts::default());
    img.add_layer(fs, 0).unwrap();
    img.get_graph().unwrap();
    img.attach_floating(bg, fs).unwrap();
    let fs_layer = img.drawable(fs).unwrap().layer_node().unwrap();

    img.remove_drawable(fs).unwrap();
    assert!(img.drawable(fs).is_none());
    assert_eq!(img.floating_layer(), None);
    assert!(img.filters(bg).unwrap().is_empty());
    assert!(!img.graph().contains(fs_layer));
    assert_eq!(img.layers().count(), 1);

    img.remove_drawable(bg).unwrap();
    assert!(img.layers().is_empty());
    assert!(matches!(
        img.remove_drawable(bg),
        Err(ComposeError::InvalidArgument(_))
    ));
}

#[test]
fn add_layer_rejects_duplicates_and_bad_indices() {
    let Scene { mut img, bg, fs } = scene(ImageOpts::default());
    assert!(matches!(
        img.add_layer(bg, 0),
        Err(ComposeError::InvalidArgument(_))
    ));
    let before = img.stages().get(StageId(0)).is_some();
    assert!(matches!(
        img.add_layer(fs, 5),
        Err(ComposeError::InvalidArgument(_))
    ));
    assert!(img.drawable(fs).unwrap().layer_stage().is_none());
    assert_eq!(img.stages().get(StageId(0)).is_some(), before);
    assert!(matches!(
        img.remove_layer(fs),
        Err(ComposeError::InvalidArgument(_))
    ));
}
