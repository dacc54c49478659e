use super::*;
use crate::graph::node::NodeGraph;
use crate::stack::stage::StagePool;

struct Fixture {
    pool: StagePool,
    graph: NodeGraph,
    filters: FilterStack,
    layer: NodeId,
    source: NodeId,
    offset: NodeId,
}

/// A host filter stack with its graph built, and a floating layer whose source feeds an
/// offset node inside its own layer node.
fn fixture() -> Fixture {
    let mut pool = StagePool::new();
    let mut graph = NodeGraph::new();
    let mut filters = FilterStack::with_pipeline(&mut pool, "host:filters", StageKind::Filter);
    let blur = pool.create("blur", StageKind::Filter, Operation::Filter("blur".into()));
    let mut cx = StackCx::new(&mut pool, &mut graph);
    filters.add(&mut cx, blur).unwrap();
    filters.get_graph(&mut cx).unwrap();

    let layer = graph.create_node(Operation::Meta, "fs");
    let source = graph.create_child(layer, Operation::Meta, "fs:source").unwrap();
    let offset = graph
        .create_child(layer, Operation::Translate, "fs:offset")
        .unwrap();
    graph.connect(source, offset, Port::Input).unwrap();

    Fixture {
        pool,
        graph,
        filters,
        layer,
        source,
        offset,
    }
}

fn params() -> OverlayParams {
    OverlayParams {
        target: PixelRect::new(10, 20, 100, 50),
        layer: PixelRect::new(30, 5, 40, 40),
        mode: BlendMode::Multiply,
        opacity: 0.75,
        selection: None,
        affect: ChannelMask::RGB,
    }
}

#[test]
fn materialize_borrows_the_source_and_tops_the_stack() {
    let mut f = fixture();
    let mut cx = StackCx::new(&mut f.pool, &mut f.graph);
    let overlay =
        Overlay::materialize(&mut cx, &mut f.filters, f.source, "Floating Selection", false)
            .unwrap();

    assert_eq!(f.filters.first(), Some(overlay.stage()));
    assert_eq!(f.filters.count(), 2);
    assert_eq!(f.graph.parent(f.source), Some(overlay.node()));
    assert_eq!(f.graph.source_of(f.offset, Port::Input), None);
    assert!(!f.graph.children(f.layer).contains(&f.source));

    let app = overlay.applicator().node();
    assert_eq!(f.graph.source_of(overlay.crop_node(), Port::Input), Some(f.source));
    assert_eq!(f.graph.source_of(app, Port::Aux), Some(overlay.crop_node()));
    let input = f.graph.input_proxy(overlay.node()).unwrap();
    let output = f.graph.output_proxy(overlay.node()).unwrap();
    assert_eq!(f.graph.source_of(app, Port::Input), Some(input));
    assert_eq!(f.graph.source_of(output, Port::Input), Some(app));
    assert_eq!(overlay.layer_source(), f.source);
}

#[test]
fn resync_derives_geometry_from_both_origins() {
    let mut f = fixture();
    let mut cx = StackCx::new(&mut f.pool, &mut f.graph);
    let mut overlay =
        Overlay::materialize(&mut cx, &mut f.filters, f.source, "fs", true).unwrap();

    assert!(overlay.resync(&mut f.graph, &params()).unwrap());
    let crop = overlay.crop_node();
    assert_eq!(f.graph.property(crop, "x"), Some(&PropValue::Float(-20.0)));
    assert_eq!(f.graph.property(crop, "y"), Some(&PropValue::Float(15.0)));
    assert_eq!(f.graph.property(crop, "width"), Some(&PropValue::Float(100.0)));
    assert_eq!(f.graph.property(crop, "height"), Some(&PropValue::Float(50.0)));

    let app = overlay.applicator();
    assert_eq!(app.apply_offset(), (20, -15));
    assert_eq!(app.mask(), None);
    assert_eq!(app.mode(), BlendMode::Multiply);
    assert_eq!(app.opacity(), 0.75);
    assert_eq!(app.affect(), ChannelMask::RGB);
}

#[test]
fn resync_is_idempotent() {
    let mut f = fixture();
    let mut cx = StackCx::new(&mut f.pool, &mut f.graph);
    let mut overlay =
        Overlay::materialize(&mut cx, &mut f.filters, f.source, "fs", false).unwrap();
    overlay.resync(&mut f.graph, &params()).unwrap();
    assert!(!overlay.resync(&mut f.graph, &params()).unwrap());
}

#[test]
fn selection_mask_is_offset_by_the_host_origin() {
    let mut f = fixture();
    let mut cx = StackCx::new(&mut f.pool, &mut f.graph);
    let mut overlay =
        Overlay::materialize(&mut cx, &mut f.filters, f.source, "fs", false).unwrap();
    let mask = BufferRef::new_gray(200, 200);
    let p = OverlayParams {
        selection: Some(mask.clone()),
        ..params()
    };
    overlay.resync(&mut f.graph, &p).unwrap();
    assert_eq!(overlay.applicator().mask(), Some(&mask));
    assert_eq!(overlay.applicator().mask_offset(), (-10, -20));

    overlay.resync(&mut f.graph, &params()).unwrap();
    assert_eq!(overlay.applicator().mask(), None);
}

#[test]
fn dismantle_restores_the_layer_composition() {
    let mut f = fixture();
    let before_layer = f.graph.snapshot(f.layer);
    let before_filters = f.graph.snapshot(f.filters.peek_graph().unwrap());

    let mut cx = StackCx::new(&mut f.pool, &mut f.graph);
    let overlay = Overlay::materialize(&mut cx, &mut f.filters, f.source, "fs", false).unwrap();
    let overlay_node = overlay.node();
    let stage = overlay.stage();
    let back = overlay
        .dismantle(
            &mut cx,
            &mut f.filters,
            Some(f.layer),
            Some((f.offset, Port::Input)),
        )
        .unwrap();

    assert_eq!(back, f.source);
    assert!(!f.graph.contains(overlay_node));
    assert!(f.pool.get(stage).is_none());
    assert_eq!(f.filters.count(), 1);
    assert_eq!(f.graph.snapshot(f.layer), before_layer);
    assert_eq!(
        f.graph.snapshot(f.filters.peek_graph().unwrap()),
        before_filters
    );
}
