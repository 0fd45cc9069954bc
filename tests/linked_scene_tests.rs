//! Integration tests for linked scenes stored in files.

use std::path::Path as FsPath;
use std::sync::Arc;

use murmur3::MurmurHash;
use scenecache::config::CacheConfig;
use scenecache::core::{string_to_path, Value};
use scenecache::indexed::OpenMode;
use scenecache::scene::{
    tagged_paths, Channel, LinkedScene, MissingBehaviour, SceneCache, SceneInterface, ScenePtr,
    SharedScenes, TagFilter,
};
use scenecache::util::{names, BBox3d, DMat4, DVec3, Name};
use scenecache::ErrorKind;

use tempfile::tempdir;

fn n(s: &str) -> Name {
    Name::new(s)
}

fn file_str(path: &FsPath) -> String {
    path.to_string_lossy().into_owned()
}

/// Route library logs to the test output, filtered by `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn shared() -> Arc<SharedScenes> {
    init_tracing();
    Arc::new(SharedScenes::new(&CacheConfig::default()))
}

fn scaled_box(s: f64) -> BBox3d {
    BBox3d::new(DVec3::splat(-s), DVec3::splat(s))
}

/// anim.scc: /root with a growing bound, a child `hand` tagged `prop`.
fn write_anim(path: &FsPath) {
    let root = SceneCache::open(path, OpenMode::WRITE, &CacheConfig::default()).expect("create anim");
    let r = root.create_typed_child(&n("root")).expect("root");
    r.write_tags(&names(&["animated"])).expect("tags");
    for frame in 0..=10 {
        let t = frame as f64;
        r.write_bound(&scaled_box(1.0 + t), t).expect("bound");
    }
    let hand = r.create_typed_child(&n("hand")).expect("hand");
    hand.write_tags(&names(&["prop"])).expect("tags");
    hand.write_transform(&DMat4::from_translation(DVec3::X), 0.0)
        .expect("transform");
    hand.write_transform(&DMat4::from_translation(DVec3::new(3.0, 0.0, 0.0)), 10.0)
        .expect("transform");
    hand.write_object(&Value::from("mesh"), 0.0).expect("object");
    root.close().expect("close anim");
}

/// main.scc: /char/geo linked to anim.scc:/root, remapping t to t + 2.
fn write_main(path: &FsPath, anim: &str, shared: &Arc<SharedScenes>) {
    let scene = LinkedScene::open(&file_str(path), OpenMode::WRITE, Arc::clone(shared)).expect("create main");
    let chr = scene.create_child(&n("char")).expect("char");
    chr.write_tags(&names(&["hero"])).expect("tags");
    let geo = chr.create_child(&n("geo")).expect("geo");
    geo.write_transform(&DMat4::from_translation(DVec3::Y), 0.0)
        .expect("transform");

    let link_node = scene
        .location(&string_to_path("/char/geo"), MissingBehaviour::ThrowIfMissing)
        .expect("location")
        .expect("geo");
    for frame in 0..=5 {
        let t = frame as f64;
        link_node
            .write_link(anim, &names(&["root"]), Some(t + 2.0), t)
            .expect("write link");
    }
    drop(link_node);
    scene.close().expect("close main");
    shared.close(&file_str(path)).expect("drop main entry");
}

fn open_at(scene: &LinkedScene, path: &str) -> ScenePtr {
    scene
        .scene(&string_to_path(path), MissingBehaviour::ThrowIfMissing)
        .expect("scene")
        .expect("location")
}

#[test]
fn test_bound_through_link_with_remap() {
    let dir = tempdir().expect("Failed to create temp dir");
    let anim = dir.path().join("anim.scc");
    let main = dir.path().join("main.scc");
    write_anim(&anim);
    let shared = shared();
    write_main(&main, &file_str(&anim), &shared);

    let scene = LinkedScene::open(&file_str(&main), OpenMode::READ, Arc::clone(&shared)).expect("open");
    let geo = open_at(&scene, "/char/geo");

    let direct = SceneCache::open(&anim, OpenMode::READ, &CacheConfig::default()).expect("anim");
    let target = direct.typed_child(&n("root")).expect("root");
    for t in [0.0, 2.5, 5.0] {
        assert_eq!(
            geo.read_bound(t).expect("bound"),
            target.read_bound(t + 2.0).expect("direct bound")
        );
    }
    // placement stays with the link location
    assert_eq!(
        geo.read_transform(0.0).expect("transform"),
        DMat4::from_translation(DVec3::Y)
    );
    // sampled at the remap times
    assert_eq!(geo.num_samples(&Channel::Bound).expect("samples"), 6);
}

#[test]
fn test_link_transparency_below_root() {
    let dir = tempdir().expect("Failed to create temp dir");
    let anim = dir.path().join("anim.scc");
    let main = dir.path().join("main.scc");
    write_anim(&anim);
    let shared = shared();
    write_main(&main, &file_str(&anim), &shared);

    let scene = LinkedScene::open(&file_str(&main), OpenMode::READ, Arc::clone(&shared)).expect("open");
    let hand = open_at(&scene, "/char/geo/hand");
    assert_eq!(hand.path_string(), "/char/geo/hand");
    assert_eq!(hand.name(), "hand");

    let direct = SceneCache::open(&anim, OpenMode::READ, &CacheConfig::default()).expect("anim");
    let target = direct
        .location(&string_to_path("/root/hand"), MissingBehaviour::ThrowIfMissing)
        .expect("location")
        .expect("hand");
    assert_eq!(
        hand.read_transform(3.0).expect("transform"),
        target.read_transform(5.0).expect("direct transform")
    );
    assert_eq!(hand.read_object(1.0).expect("object"), Value::from("mesh"));

    assert!(hand.has_tag(&n("prop"), TagFilter::LOCAL).expect("tag"));
    for tag in ["hero", "animated"] {
        assert!(hand.has_tag(&n(tag), TagFilter::ANCESTOR).expect("tag"), "{tag}");
    }
    assert!(hand.write_tags(&names(&["nope"])).is_err());
}

#[test]
fn test_tags_copied_for_pruning() {
    let dir = tempdir().expect("Failed to create temp dir");
    let anim = dir.path().join("anim.scc");
    let main = dir.path().join("main.scc");
    write_anim(&anim);
    let shared = shared();
    write_main(&main, &file_str(&anim), &shared);

    let scene = LinkedScene::open(&file_str(&main), OpenMode::READ, Arc::clone(&shared)).expect("open");
    assert!(scene.has_tag(&n("prop"), TagFilter::DESCENDANT).expect("tag"));
    let found = tagged_paths(&scene, &n("prop")).expect("walk");
    assert_eq!(found.paths, vec![string_to_path("/char/geo/hand")]);

    let geo = open_at(&scene, "/char/geo");
    assert!(geo.attribute_names().expect("attributes").is_empty());
    let locations = scene.link_locations().expect("link locations");
    assert_eq!(locations.path_strings(), vec!["/char/geo".to_string()]);
}

#[test]
fn test_missing_link_target_fails_on_access() {
    let dir = tempdir().expect("Failed to create temp dir");
    let main = dir.path().join("main.scc");
    let shared = shared();
    {
        let scene = LinkedScene::open(&file_str(&main), OpenMode::WRITE, Arc::clone(&shared)).expect("create");
        let node = scene
            .location(&names(&["geo"]), MissingBehaviour::CreateIfMissing)
            .expect("create")
            .expect("geo");
        let missing = file_str(&dir.path().join("missing.scc"));
        node.write_link(&missing, &names(&["root"]), None, 0.0)
            .expect("links are not validated when written");
        drop(node);
        scene.close().expect("close");
        shared.close(&file_str(&main)).expect("drop entry");
    }

    let scene = LinkedScene::open(&file_str(&main), OpenMode::READ, Arc::clone(&shared)).expect("open");
    // construction and lookup of the link root do no I/O on the target
    let geo = open_at(&scene, "/geo");
    let err = geo.child_names().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathNotFound);
    assert!(geo.read_bound(0.0).is_err());
}

#[test]
fn test_lscc_files_open_as_linked_scenes() {
    let dir = tempdir().expect("Failed to create temp dir");
    let anim = dir.path().join("anim.scc");
    let main = dir.path().join("main.lscc");
    write_anim(&anim);
    let shared = shared();
    write_main(&main, &file_str(&anim), &shared);

    let scene = scenecache::scene::create(&file_str(&main), OpenMode::READ).expect("open lscc");
    let hand = scene
        .scene_at("/char/geo/hand", MissingBehaviour::ThrowIfMissing)
        .expect("scene")
        .expect("hand");
    assert_eq!(hand.read_object(0.0).expect("object"), Value::from("mesh"));

    // a plain scene cache does not follow the link
    let plain = scenecache::scene::create(&file_str(&anim), OpenMode::READ).expect("open scc");
    assert_eq!(plain.child_names().expect("children"), vec![n("root")]);
    let geo = SceneCache::open(&main, OpenMode::READ, &CacheConfig::default())
        .expect("main")
        .location(&string_to_path("/char/geo"), MissingBehaviour::ThrowIfMissing)
        .expect("location")
        .expect("geo");
    assert!(geo.child_names().expect("children").is_empty());
}

#[test]
fn test_hash_set_through_files() {
    let dir = tempdir().expect("Failed to create temp dir");
    let anim = dir.path().join("anim.scc");
    let main = dir.path().join("main.scc");
    write_anim(&anim);
    let shared = shared();
    write_main(&main, &file_str(&anim), &shared);

    let scene = LinkedScene::open(&file_str(&main), OpenMode::READ, Arc::clone(&shared)).expect("open");
    let hash = |set: &str| {
        let mut h = MurmurHash::new();
        scene.hash_set(&n(set), &mut h).expect("hash set");
        h
    };
    assert_eq!(hash("prop"), hash("prop"));
    assert_ne!(hash("prop"), hash("nothing"));

    let geo = open_at(&scene, "/char/geo");
    let mut at_link = MurmurHash::new();
    geo.hash_set(&n("prop"), &mut at_link).expect("hash set");
    assert_ne!(at_link, hash("prop"));
}
