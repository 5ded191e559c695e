//! End-to-end behaviour of the object graph.

use ldraw_dom::{
    CodeStandards, CollectionChange, CollectionView, Document, DomError, DomEvent, ElementKind,
    EventFilter, Matrix4d, ObjectId, Property, Vector3d,
};
use std::cell::RefCell;
use std::rc::Rc;

fn v(x: f64, y: f64, z: f64) -> Vector3d {
    Vector3d::new(x, y, z)
}

/// Document > page > step, all attached.
fn model(doc: &mut Document) -> (ObjectId, ObjectId) {
    let page = doc.create_page("model.ldr").unwrap();
    let step = doc.create_step();
    doc.add(doc.root(), page).unwrap();
    doc.add(page, step).unwrap();
    (page, step)
}

fn record_all(doc: &mut Document) -> Rc<RefCell<Vec<DomEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    doc.subscribe(EventFilter::All, move |_, event| sink.borrow_mut().push(event.clone()));
    seen
}

#[test]
fn test_line_from_code() {
    let mut doc = Document::new();
    let line = doc.create_from_code("2 1 1 0 0 2 0 0").unwrap();
    assert_eq!(doc.kind(line).unwrap(), ElementKind::Line);
    assert_eq!(doc.colour_value(line).unwrap(), 1);
    assert_eq!(doc.vertex(line, 0).unwrap(), v(1.0, 0.0, 0.0));
    assert_eq!(doc.vertex(line, 1).unwrap(), v(2.0, 0.0, 0.0));
}

#[test]
fn test_colocated_line_has_problems() {
    let mut doc = Document::new();
    let line = doc.create_line(24, v(3.0, 1.0, 0.0), v(3.0, 1.0, 0.0)).unwrap();
    assert!(doc.is_colocated(line).unwrap());
    assert!(doc.has_problems(line, CodeStandards::Full).unwrap());
}

#[test]
fn test_direct_colour_in_every_mode() {
    let mut doc = Document::new();
    let (_page, step) = model(&mut doc);
    let tri = doc
        .create_triangle(0x2FF00FF, [v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0)])
        .unwrap();
    doc.add(step, tri).unwrap();

    for standards in [
        CodeStandards::Full,
        CodeStandards::OfficialModelRepository,
        CodeStandards::PartsLibrary,
    ] {
        assert_eq!(
            doc.to_code(tri, standards).unwrap(),
            "3 #2FF00FF 0 0 0 1 0 0 0 1 0\r\n"
        );
    }
}

#[test]
fn test_lock_decorator_depends_on_standards() {
    let mut doc = Document::new();
    let (_page, step) = model(&mut doc);
    let line = doc.create_line(16, v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0)).unwrap();
    doc.add(step, line).unwrap();
    doc.set_locked(line, true).unwrap();

    let parts = doc.to_code(line, CodeStandards::PartsLibrary).unwrap();
    assert!(!parts.contains("LOCKNEXT"));
    assert_eq!(parts, "2 16 0 0 0 1 0 0\r\n");

    for standards in [CodeStandards::Full, CodeStandards::OfficialModelRepository] {
        let code = doc.to_code(line, standards).unwrap();
        assert!(code.starts_with("0 !DIGITALIS_LDTOOLS_DOM LOCKNEXT\r\n"));
    }
}

#[test]
fn test_duplicate_group_name_on_page() {
    let mut doc = Document::new();
    let (_page, step) = model(&mut doc);
    let first = doc.create_group("g1").unwrap();
    let second = doc.create_group("g2").unwrap();
    doc.add_range(step, &[first, second]).unwrap();

    let result = doc.set_name(second, "g1");
    assert!(matches!(result, Err(DomError::DuplicateName(_))));
    assert_eq!(doc.name(second).unwrap(), "g2");
}

#[test]
fn test_disposal_monotonicity() {
    let mut doc = Document::new();
    let (_page, step) = model(&mut doc);
    let line = doc.create_line(24, v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0)).unwrap();
    doc.add(step, line).unwrap();

    doc.dispose(line).unwrap();
    assert!(doc.is_disposed(line).unwrap());
    assert!(matches!(doc.colour_value(line), Err(DomError::Disposed(_))));
    assert!(matches!(doc.coordinates(line), Err(DomError::Disposed(_))));
    assert!(matches!(doc.is_locked(line), Err(DomError::Disposed(_))));
    assert!(matches!(doc.set_visible(line, false), Err(DomError::Disposed(_))));
    doc.dispose(line).unwrap();
    doc.dispose(line).unwrap();
    assert!(doc.is_disposed(line).unwrap());
}

#[test]
fn test_freeze_is_transitive() {
    let mut doc = Document::new();
    let (page, step) = model(&mut doc);
    let comment = doc.create_comment("hello").unwrap();
    doc.add(step, comment).unwrap();

    doc.freeze(page).unwrap();
    for id in [page, step, comment] {
        assert!(doc.is_frozen(id).unwrap());
    }
    assert!(matches!(doc.set_text(comment, "bye"), Err(DomError::Frozen(_))));
    assert!(matches!(doc.remove(step, comment), Err(DomError::Frozen(_))));
    assert_eq!(doc.text(comment).unwrap(), "hello");
}

#[test]
fn test_setting_same_value_is_silent() {
    let mut doc = Document::new();
    let (page, step) = model(&mut doc);
    let line = doc.create_line(24, v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0)).unwrap();
    doc.add(step, line).unwrap();
    let history = doc.undo_name().map(str::to_string);

    let seen = record_all(&mut doc);
    doc.set_colour_value(line, 24).unwrap();
    doc.set_coordinates(line, &[v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0)]).unwrap();
    doc.set_name(page, "model.ldr").unwrap();
    doc.set_visible(line, true).unwrap();

    assert!(seen.borrow().is_empty());
    assert_eq!(doc.undo_name().map(str::to_string), history);
}

#[test]
fn test_one_event_pair_per_change() {
    let mut doc = Document::new();
    let (_page, step) = model(&mut doc);
    let line = doc.create_line(24, v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0)).unwrap();
    doc.add(step, line).unwrap();

    let seen = record_all(&mut doc);
    doc.set_colour_value(line, 4).unwrap();

    let events = seen.borrow();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        DomEvent::PropertyChanged { source, args } if *source == line && args.property == Property::ColourValue
    ));
    assert!(matches!(
        &events[1],
        DomEvent::Changed { source, operation: "ColourValueChanged", .. } if *source == line
    ));
}

#[test]
fn test_clone_and_serialize_are_disconnected() {
    let mut doc = Document::new();
    let (page, step) = model(&mut doc);
    let group = doc.create_group("g").unwrap();
    let line = doc.create_line(24, v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0)).unwrap();
    doc.add_range(step, &[group, line]).unwrap();
    doc.group_add(group, line).unwrap();
    doc.subscribe(EventFilter::Source(line), |_, _| {});
    doc.freeze(page).unwrap();

    let clone = doc.clone_node(line).unwrap();
    assert_eq!(doc.subscriber_count(clone), 0);
    assert_eq!(doc.parent(clone).unwrap(), None);
    assert_eq!(doc.group_of(clone).unwrap(), None);
    assert_eq!(doc.page_of(clone).unwrap(), None);
    assert_eq!(doc.step_of(clone).unwrap(), None);
    assert!(!doc.is_frozen(clone).unwrap());

    let bytes = doc.serialize_node(line).unwrap();
    let copy = doc.deserialize_node(&bytes).unwrap();
    assert_eq!(doc.subscriber_count(copy), 0);
    assert_eq!(doc.parent(copy).unwrap(), None);
    assert_eq!(doc.group_of(copy).unwrap(), None);
    assert!(doc.is_frozen(copy).unwrap());
    assert_eq!(doc.coordinates(copy).unwrap(), doc.coordinates(line).unwrap());
}

#[test]
fn test_coordinate_counts() {
    let mut doc = Document::new();
    let line = doc.create_line(24, v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0)).unwrap();
    let tri = doc
        .create_triangle(16, [v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0)])
        .unwrap();
    let optional = doc
        .create_optional_line(
            24,
            [v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0), v(0.0, -1.0, 0.0)],
        )
        .unwrap();

    assert_eq!(doc.coordinates(line).unwrap().len(), 2);
    assert_eq!(doc.coordinates(tri).unwrap().len(), 3);
    assert_eq!(doc.coordinates(optional).unwrap().len(), 4);

    let three = [v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(2.0, 0.0, 0.0)];
    assert!(matches!(
        doc.set_coordinates(line, &three),
        Err(DomError::CoordinateCount { expected: 2, actual: 3 })
    ));
    assert!(doc.set_coordinates(optional, &three).is_err());
    assert!(doc
        .create_graphic(ldraw_dom::node::GraphicKind::Triangle, 16, &three[..2])
        .is_err());
}

#[test]
fn test_group_membership_consistency() {
    let mut doc = Document::new();
    let (page, step) = model(&mut doc);
    let group = doc.create_group("wheels").unwrap();
    let member = doc.create_comment("wheel").unwrap();
    doc.add_range(step, &[group, member]).unwrap();
    doc.group_add(group, member).unwrap();
    assert!(doc.group_contains(group, member).unwrap());
    assert_eq!(doc.group_of(member).unwrap(), Some(group));

    // the common step leaves together: membership survives
    doc.remove(page, step).unwrap();
    assert!(doc.group_contains(group, member).unwrap());
    assert_eq!(doc.group_of(member).unwrap(), Some(group));

    // the member leaves on its own: membership is cut on both sides
    doc.remove(step, member).unwrap();
    assert!(!doc.group_contains(group, member).unwrap());
    assert_eq!(doc.group_of(member).unwrap(), None);

    // undo brings the link back with the member
    doc.undo().unwrap();
    assert_eq!(doc.group_of(member).unwrap(), Some(group));
    assert!(doc.group_contains(group, member).unwrap());
}

#[test]
fn test_members_in_separate_steps_split_by_detaching_a_step() {
    let mut doc = Document::new();
    let (page, first) = model(&mut doc);
    let second = doc.create_step();
    doc.add(page, second).unwrap();
    let group = doc.create_group("g").unwrap();
    let member = doc.create_comment("m").unwrap();
    doc.add(first, group).unwrap();
    doc.add(second, member).unwrap();
    doc.group_add(group, member).unwrap();

    doc.remove(page, second).unwrap();
    assert_eq!(doc.group_of(member).unwrap(), None);
    assert_eq!(doc.group_member_count(group).unwrap(), 0);
}

#[test]
fn test_command_bracket_undo_redo() {
    let mut doc = Document::new();
    let (page, step) = model(&mut doc);
    let line = doc.create_line(24, v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0)).unwrap();

    doc.start_command("Edit line");
    doc.add(step, line).unwrap();
    doc.set_colour_value(line, 4).unwrap();
    doc.set_vertex(line, 1, v(5.0, 0.0, 0.0)).unwrap();
    assert!(matches!(doc.undo(), Err(DomError::InvalidOperation(_))));
    doc.end_command().unwrap();

    assert_eq!(doc.undo_name(), Some("Edit line"));
    assert!(doc.undo().unwrap());
    assert_eq!(doc.count(step).unwrap(), 0);
    assert_eq!(doc.colour_value(line).unwrap(), 24);
    assert_eq!(doc.vertex(line, 1).unwrap(), v(1.0, 0.0, 0.0));

    assert!(doc.redo().unwrap());
    assert_eq!(doc.page_elements(page).unwrap(), vec![line]);
    assert_eq!(doc.colour_value(line).unwrap(), 4);
    assert_eq!(doc.vertex(line, 1).unwrap(), v(5.0, 0.0, 0.0));
    assert!(!doc.redo().unwrap());
}

#[test]
fn test_lock_is_inherited() {
    let mut doc = Document::new();
    let (page, step) = model(&mut doc);
    let reference = doc
        .create_reference(16, Matrix4d::IDENTITY, "3001.dat")
        .unwrap();
    doc.add(step, reference).unwrap();

    doc.set_locked(page, true).unwrap();
    assert!(doc.is_locked(reference).unwrap());
    assert!(!doc.is_local_lock(reference).unwrap());
    assert!(matches!(doc.set_target_name(reference, "3002.dat"), Err(DomError::Locked(_))));
    assert!(matches!(doc.set_locked(reference, false), Err(DomError::Locked(_))));

    doc.set_locked(page, false).unwrap();
    doc.set_target_name(reference, "3002.dat").unwrap();
}

#[test]
fn test_page_view_tracks_steps() {
    let mut doc = Document::new();
    let (page, step) = model(&mut doc);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    doc.subscribe(EventFilter::Collection(page, CollectionView::PageElements), move |_, event| {
        if let DomEvent::CollectionChanged { args, .. } = event {
            sink.borrow_mut().push(args.change);
        }
    });

    let a = doc.create_comment("a").unwrap();
    let b = doc.create_comment("b").unwrap();
    doc.add(step, a).unwrap();
    doc.page_elements_add(page, b).unwrap();
    let c = doc.create_comment("c").unwrap();
    doc.page_elements_replace(page, 0, c).unwrap();
    doc.page_elements_remove(page, b).unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![
            CollectionChange::Added,
            CollectionChange::Added,
            CollectionChange::Replaced,
            CollectionChange::Removed,
        ]
    );
}

#[test]
fn test_round_trip_keeps_decorators() {
    let mut doc = Document::new();
    let (page, step) = model(&mut doc);
    doc.set_title(page, "Decorated").unwrap();
    let group = doc.create_group("Body").unwrap();
    let quad = doc
        .create_quadrilateral(
            4,
            [v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(1.0, 1.0, 0.0), v(0.0, 1.0, 0.0)],
        )
        .unwrap();
    doc.add_range(step, &[group, quad]).unwrap();
    doc.group_add(group, quad).unwrap();
    doc.set_ghosted(quad, true).unwrap();
    doc.set_geometry_locked(quad, true).unwrap();

    let code = doc.to_code(page, CodeStandards::Full).unwrap();

    let mut other = Document::new();
    let outcome = ldraw_dom::Parser::new().parse_document(&mut other, &code).unwrap();
    assert!(!outcome.document_modified);
    assert_eq!(other.to_code(outcome.pages[0], CodeStandards::Full).unwrap(), code);
}
