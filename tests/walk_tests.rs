//! Integration tests for tag-pruned set queries.

use std::sync::Arc;

use scenecache::core::{string_to_path, PathMatcher, Value};
use scenecache::indexed::OpenMode;
use scenecache::scene::{
    par_bound, par_tagged_paths, tagged_paths, LinkedScene, MissingBehaviour, SceneCache,
    SceneInterface, SharedScenes, FILE_NAME_LINK_ATTRIBUTE, ROOT_LINK_ATTRIBUTE,
};
use scenecache::util::{names, BBox3d, DMat4, DVec3, Name};
use scenecache::ErrorKind;

fn n(s: &str) -> Name {
    Name::new(s)
}

fn create(root: &SceneCache, path: &str) -> SceneCache {
    root.location(&string_to_path(path), MissingBehaviour::CreateIfMissing)
        .expect("create")
        .expect("location")
}

/// Wide tree where only /a/b/c is tagged.
fn sparse_scene() -> SceneCache {
    let root = SceneCache::in_memory("sparse").expect("scene");
    for i in 0..20 {
        create(&root, &format!("/wide{i}/leaf"));
    }
    create(&root, "/a/b/c").write_tags(&names(&["T"])).expect("tags");
    create(&root, "/a/d");
    root
}

#[test]
fn test_walk_prunes_untagged_subtrees() {
    let root = sparse_scene();
    let result = tagged_paths(&root, &n("T")).expect("walk");
    assert_eq!(result.paths, vec![string_to_path("/a/b/c")]);

    // root, 20 wide children, a, b, c, d
    assert_eq!(result.stats.visited, 25);
    assert_eq!(result.stats.pruned, 21);
}

#[test]
fn test_read_set_matches_walk() {
    let root = SceneCache::in_memory("sets").expect("scene");
    let mut members = PathMatcher::new();
    members.add_path(&string_to_path("/x/y"));
    members.add_path(&string_to_path("/z"));
    root.write_set(&n("S"), &members).expect("write set");

    let set = root.read_set(&n("S"), true).expect("read set");
    assert_eq!(set, members);
    assert_eq!(root.set_names(true).expect("names"), names(&["S"]));
    assert!(root.set_names(false).expect("names").is_empty());
    assert!(root.read_set(&n("S"), false).expect("local").is_empty());
}

#[test]
fn test_parallel_walk_equals_serial() {
    let root = SceneCache::in_memory("par").expect("scene");
    for i in 0..8 {
        for j in 0..8 {
            let loc = create(&root, &format!("/g{i}/item{j}"));
            if (i + j) % 3 == 0 {
                loc.write_tags(&names(&["hit"])).expect("tags");
            }
        }
    }
    let serial = tagged_paths(&root, &n("hit")).expect("serial");
    let parallel = par_tagged_paths(&root, &n("hit"));
    assert!(parallel.is_complete());
    assert_eq!(parallel.paths, serial.paths);
    assert_eq!(parallel.stats, serial.stats);
}

#[test]
fn test_parallel_walk_reports_broken_link() {
    let main = SceneCache::in_memory("main").expect("scene");
    create(&main, "/good").write_tags(&names(&["T"])).expect("tags");
    let broken = create(&main, "/broken");
    broken
        .write_attribute(&n(FILE_NAME_LINK_ATTRIBUTE), &Value::from("gone.scc"), 0.0)
        .expect("file");
    broken
        .write_attribute(&n(ROOT_LINK_ATTRIBUTE), &Value::Names(Vec::new()), 0.0)
        .expect("root");
    // the link claims tagged content below it
    broken.write_descendant_tags(&names(&["T"])).expect("descendant tags");

    let shared = Arc::new(SharedScenes::with_opener(
        4,
        Arc::new(|file: &str, _: OpenMode| Err(scenecache::Error::not_found(file.to_string()))),
    ));
    let scene = LinkedScene::new(main.snapshot().expect("snapshot"), shared);

    assert!(tagged_paths(&scene, &n("T")).is_err());

    let report = par_tagged_paths(&scene, &n("T"));
    assert_eq!(report.paths, vec![string_to_path("/good")]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, string_to_path("/broken"));
    assert_eq!(report.errors[0].1.kind(), ErrorKind::PathNotFound);
}

#[test]
fn test_par_bound() {
    let root = SceneCache::in_memory("bounds").expect("scene");
    let a = create(&root, "/a");
    a.write_transform(&DMat4::from_translation(DVec3::new(10.0, 0.0, 0.0)), 0.0)
        .expect("transform");
    create(&root, "/a/leaf")
        .write_bound(&BBox3d::new(DVec3::ZERO, DVec3::ONE), 0.0)
        .expect("bound");
    create(&root, "/b")
        .write_bound(&BBox3d::new(DVec3::splat(-1.0), DVec3::ZERO), 0.0)
        .expect("bound");

    let report = par_bound(&root, 0.0);
    assert!(report.errors.is_empty());
    assert_eq!(report.bound.min, DVec3::splat(-1.0));
    assert_eq!(report.bound.max, DVec3::new(11.0, 1.0, 1.0));
}

#[test]
fn test_readonly_open_mode_rejects_writes() {
    let root = SceneCache::in_memory("ro").expect("scene");
    create(&root, "/a");
    let ro = root.snapshot().expect("snapshot");
    assert_eq!(ro.open_mode(), OpenMode::READ);
    assert!(ro.create_typed_child(&n("b")).is_err());
}
