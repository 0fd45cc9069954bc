//! Integration tests for writing scene cache files and reading them back.

use scenecache::config::CacheConfig;
use scenecache::core::{string_to_path, Value};
use scenecache::indexed::OpenMode;
use scenecache::scene::{Channel, MissingBehaviour, SceneCache, SceneInterface, TagFilter};
use scenecache::util::{names, BBox3d, DMat4, DVec3, Name};
use scenecache::{Error, ErrorKind};

use tempfile::tempdir;

fn n(s: &str) -> Name {
    Name::new(s)
}

fn unit_box() -> BBox3d {
    BBox3d::new(DVec3::splat(-1.0), DVec3::splat(1.0))
}

#[test]
fn test_roundtrip_hierarchy() {
    let dir = tempdir().expect("Failed to create temp dir");
    let file = dir.path().join("shot.scc");
    let config = CacheConfig::default();

    {
        let root = SceneCache::open(&file, OpenMode::WRITE, &config).expect("Failed to create scene");
        let chr = root.create_typed_child(&n("char")).expect("char");
        chr.write_transform(&DMat4::from_translation(DVec3::new(0.0, 2.0, 0.0)), 0.0)
            .expect("transform");
        chr.write_attribute(&n("user:id"), &Value::Int(42), 0.0)
            .expect("attribute");
        chr.write_tags(&names(&["characters"])).expect("tags");

        let geo = chr.create_typed_child(&n("geo")).expect("geo");
        geo.write_object(&Value::Doubles(vec![1.0, 2.0, 3.0]), 0.0)
            .expect("object 0");
        geo.write_object(&Value::Doubles(vec![3.0, 4.0, 5.0]), 1.0)
            .expect("object 1");
        geo.write_bound(&unit_box(), 0.0).expect("bound");

        root.create_typed_child(&n("cam")).expect("cam");
        root.close().expect("close");
    }

    let root = SceneCache::open(&file, OpenMode::READ, &config).expect("Failed to open scene");
    assert_eq!(root.child_names().expect("children"), names(&["char", "cam"]));

    let geo = root
        .scene(&string_to_path("/char/geo"), MissingBehaviour::ThrowIfMissing)
        .expect("scene")
        .expect("geo");
    assert_eq!(geo.path_string(), "/char/geo");
    assert_eq!(geo.num_samples(&Channel::Object).expect("samples"), 2);
    assert_eq!(
        geo.read_object(0.5).expect("object"),
        Value::Doubles(vec![2.0, 3.0, 4.0])
    );
    assert!(geo.has_tag(&n("characters"), TagFilter::ANCESTOR).expect("tag"));

    let chr = root.typed_child(&n("char")).expect("char");
    assert_eq!(chr.read_attribute(&n("user:id"), 0.0).expect("attr"), Value::Int(42));
    assert!(chr.has_tag(&n("characters"), TagFilter::LOCAL).expect("tag"));
    assert!(root.has_tag(&n("characters"), TagFilter::DESCENDANT).expect("tag"));
    assert!(!root.has_tag(&n("characters"), TagFilter::LOCAL).expect("tag"));

    let err = chr.write_tags(&names(&["x"])).unwrap_err();
    assert!(matches!(err, Error::ReadOnly(_)));
}

#[test]
fn test_bounds_propagated_on_close() {
    let dir = tempdir().expect("Failed to create temp dir");
    let file = dir.path().join("bounds.scc");
    let config = CacheConfig::default();

    {
        let root = SceneCache::open(&file, OpenMode::WRITE, &config).expect("create");
        let group = root.create_typed_child(&n("group")).expect("group");
        let a = group.create_typed_child(&n("a")).expect("a");
        a.write_bound(&unit_box(), 0.0).expect("bound");
        a.write_transform(&DMat4::from_translation(DVec3::new(5.0, 0.0, 0.0)), 0.0)
            .expect("transform");
        let b = group.create_typed_child(&n("b")).expect("b");
        b.write_bound(&unit_box(), 0.0).expect("bound");
        b.write_bound(&unit_box(), 2.0).expect("bound");
        // dropping the last handle finalizes
    }

    let root = SceneCache::open(&file, OpenMode::READ, &config).expect("open");
    let group = root.typed_child(&n("group")).expect("group");
    assert!(group.has_bound().expect("has bound"));
    let bound = group.read_bound(0.0).expect("bound");
    assert_eq!(bound.min, DVec3::splat(-1.0));
    assert_eq!(bound.max, DVec3::new(6.0, 1.0, 1.0));
    assert_eq!(
        group.sample_times(&Channel::Bound).expect("times").as_slice(),
        &[0.0, 2.0]
    );
    assert!(root.has_bound().expect("root bound"));
}

#[test]
fn test_append_keeps_content() {
    let dir = tempdir().expect("Failed to create temp dir");
    let file = dir.path().join("append.scc");
    let config = CacheConfig::default();

    {
        let root = SceneCache::open(&file, OpenMode::WRITE, &config).expect("create");
        root.create_typed_child(&n("first")).expect("first");
    }
    {
        let root = SceneCache::open(&file, OpenMode::APPEND, &config).expect("append");
        assert!(root.has_child(&n("first")).expect("has"));
        let second = root.create_typed_child(&n("second")).expect("second");
        second.write_tags(&names(&["late"])).expect("tags");
    }

    let root = SceneCache::open(&file, OpenMode::READ, &config).expect("open");
    assert_eq!(root.child_names().expect("children"), names(&["first", "second"]));
    assert!(root.has_tag(&n("late"), TagFilter::DESCENDANT).expect("tag"));
}

#[test]
fn test_missing_file_and_location() {
    let dir = tempdir().expect("Failed to create temp dir");
    let config = CacheConfig::default();
    let err = SceneCache::open(dir.path().join("none.scc"), OpenMode::READ, &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathNotFound);

    let root = SceneCache::in_memory("mem").expect("scene");
    let missing = root
        .scene(&string_to_path("/a/b"), MissingBehaviour::NullIfMissing)
        .expect("lookup");
    assert!(missing.is_none());
    let err = root
        .scene(&string_to_path("/a/b"), MissingBehaviour::ThrowIfMissing)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathNotFound);
    let created = root
        .scene(&string_to_path("/a/b"), MissingBehaviour::CreateIfMissing)
        .expect("create")
        .expect("created");
    assert_eq!(created.path_string(), "/a/b");
}

#[test]
fn test_out_of_order_sample_rejected() {
    let root = SceneCache::in_memory("mem").expect("scene");
    let a = root.create_typed_child(&n("a")).expect("a");
    a.write_transform(&DMat4::IDENTITY, 2.0).expect("t2");
    let err = a.write_transform(&DMat4::IDENTITY, 1.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    // same time replaces
    a.write_transform(&DMat4::from_scale(DVec3::splat(2.0)), 2.0)
        .expect("replace");
    assert_eq!(a.num_samples(&Channel::Transform).expect("samples"), 1);
}

#[test]
fn test_scene_at_requires_absolute_path() {
    let root = SceneCache::in_memory("mem").expect("scene");
    root.create_typed_child(&n("a")).expect("a");
    let a = root
        .scene_at("/a", MissingBehaviour::ThrowIfMissing)
        .expect("lookup")
        .expect("a");
    assert_eq!(a.path_string(), "/a");
    let err = root
        .scene_at("a", MissingBehaviour::ThrowIfMissing)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}
