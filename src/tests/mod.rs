//! Cross-module tests: whole configurations in, access decisions out.

use std::sync::Arc;
use std::thread;

use yare::parameterized;

use crate::{parse, Access, AuthzEngine, AuthzError};

const GROUPS: &str = r#"
[groups]
devs = alice, bob
ops = @devs, carol
"#;

const RULES: &str = r#"
[aliases]
lead = alice

[/]
* = r

[/secret]
* =

[repo1:/]
@devs = rw

[/ops-area]
@ops = rwd

[/public-drop]
~@ops = rw

[/handover]
&lead = rw
"#;

fn model() -> crate::AuthzModel {
    parse(RULES, Some(GROUPS)).unwrap()
}

#[test]
fn parse_returns_a_model_or_a_typed_error() {
    assert!(parse(RULES, Some(GROUPS)).is_ok());
    assert!(parse("[/]\nbroken line\n", None).is_err());
}

#[parameterized(
    everyone_reads_the_root = { Some("mallory"), "repo1", "/", "r" },
    secret_is_denied_to_everyone = { Some("mallory"), "repo1", "/secret/file", "" },
    secret_is_denied_to_members_too = { Some("alice"), "repo1", "/secret", "" },
    devs_write_in_repo1 = { Some("alice"), "repo1", "/x", "rw" },
    devs_do_not_write_elsewhere = { Some("alice"), "repo2", "/x", "r" },
    outsiders_keep_the_root_grant_in_repo1 = { Some("carol"), "repo1", "/x", "r" },
    ops_members_manage_their_area = { Some("carol"), "repo1", "/ops-area/runbook", "rwd" },
    non_ops_read_the_ops_area = { Some("mallory"), "repo1", "/ops-area", "r" },
    outsiders_write_the_public_drop = { Some("mallory"), "repo1", "/public-drop", "rw" },
    ops_members_keep_root_read_in_the_drop = { Some("alice"), "repo1", "/public-drop", "r" },
    alias_grants_apply = { Some("alice"), "repo1", "/handover/notes", "rw" },
    anonymous_reads_the_root = { None, "repo1", "/", "r" },
    anonymous_is_kept_out_of_secret = { None, "repo1", "/secret", "" },
)]
fn end_to_end_lookups(user: Option<&str>, repos: &str, path: &str, expected: &str) {
    let model = model();
    assert_eq!(
        model.access_for(user, repos, path),
        expected.parse::<Access>().unwrap()
    );
}

#[test]
fn most_specific_path_wins_regardless_of_file_order() {
    let early_specific = "[/project/sub]\nharry = rw\n\n[/project]\nharry = r\n";
    let late_specific = "[/project]\nharry = r\n\n[/project/sub]\nharry = rw\n";
    for rules in [early_specific, late_specific] {
        let model = parse(rules, None).unwrap();
        assert_eq!(
            model.access_for(Some("harry"), "calc", "/project/sub/file"),
            Access::READ | Access::WRITE
        );
        assert_eq!(
            model.access_for(Some("harry"), "calc", "/project/other"),
            Access::READ
        );
    }
}

#[test]
fn lookups_are_deterministic_across_repeated_calls() {
    let model = model();
    let inputs = [
        (Some("alice"), "repo1", "/x"),
        (Some("carol"), "repo1", "/ops-area"),
        (None, "repo2", "/secret"),
    ];
    for (user, repos, path) in inputs {
        let first = model.access_for(user, repos, path);
        for _ in 0..10 {
            assert_eq!(model.access_for(user, repos, path), first);
        }
    }
}

#[test]
fn global_bounds_are_monotonic_and_cover_every_lookup() {
    let rules = "[/]\nharry = rw\n\n[/tags]\nharry = r\n\n[calc:/trunk]\nharry = rwd\n";
    let model = parse(rules, None).unwrap();
    let bounds = model.global_rights("harry").unwrap().rights_for("").unwrap();
    assert!(bounds.max_access.contains(bounds.min_access));

    for path in ["/", "/tags", "/trunk"] {
        let result = model.access_for(Some("harry"), "calc", path);
        assert!(bounds.max_access.contains(result));
        assert!(result.contains(bounds.min_access));
    }
}

#[parameterized(
    anonymous_has_root_read = { None, "repo1", true },
    known_user_in_her_repo = { Some("alice"), "repo1", true },
    known_user_anywhere = { Some("alice"), "", true },
    stranger_still_has_anon_read = { Some("mallory"), "repo1", true },
)]
fn has_any_access_uses_the_precomputed_bounds(user: Option<&str>, repos: &str, expected: bool) {
    assert_eq!(model().has_any_access(user, repos), expected);
}

#[test]
fn has_any_access_is_false_without_matching_rights() {
    let rules = "[calc:/trunk]\nharry = rw\n";
    let model = parse(rules, None).unwrap();
    assert!(model.has_any_access(Some("harry"), "calc"));
    assert!(!model.has_any_access(Some("harry"), "paint"));
    assert!(!model.has_any_access(Some("sally"), "calc"));
    assert!(!model.has_any_access(None, "calc"));
}

#[test]
fn anonymous_grants_are_a_floor_for_authenticated_users() {
    let model = parse("[/]\n$anonymous = r\n", None).unwrap();
    assert_eq!(model.access_for(None, "calc", "/"), Access::READ);
    // Credentials can always be dropped, so authenticated users keep the
    // anonymous floor.
    assert_eq!(model.access_for(Some("carol"), "calc", "/"), Access::READ);
}

#[test]
fn authenticated_grants_exclude_anonymous_users() {
    let model = parse("[/]\n$authenticated = rw\n", None).unwrap();
    assert_eq!(model.access_for(None, "calc", "/"), Access::NONE);
    assert_eq!(
        model.access_for(Some("carol"), "calc", "/"),
        Access::READ | Access::WRITE
    );
}

#[test]
fn group_cycle_fails_with_the_offending_chain() {
    let groups = "[groups]\ng1 = @g2\ng2 = @g1\n";
    match parse("[/]\n@g1 = r\n", Some(groups)) {
        Err(AuthzError::Cycle(chain)) => {
            insta::assert_snapshot!(chain, @"@g1 -> @g2 -> @g1");
        }
        other => panic!("expected Cycle, got {other:?}"),
    }
}

#[test]
fn error_messages_name_the_problem() {
    let err = parse("[/]\nharry = rz\n", None).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @r#"syntax error at line 2: unrecognized access letter 'z' in "rz""#
    );

    let err = parse("[/]\n@ghosts = r\n", None).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"reference to undefined group @ghosts");
}

#[test]
fn errors_serialize_for_transport() {
    let err = parse("[/]\n@ghosts = r\n", None).unwrap_err();
    let json = serde_json::to_string(&err).unwrap();
    let back: AuthzError = serde_json::from_str(&json).unwrap();
    assert_eq!(back, err);
}

#[test]
fn concurrent_lookups_agree() {
    let engine = Arc::new(AuthzEngine::new_from_str(RULES, Some(GROUPS)).unwrap());

    let mut handles = vec![];
    for i in 0..10 {
        let engine = Arc::clone(&engine);
        let handle = thread::spawn(move || {
            let users = [Some("alice"), Some("bob"), Some("carol"), None];
            for n in 0..100 {
                let user = users[(i + n) % users.len()];
                let access = engine.access_for(user, "repo1", "/ops-area").unwrap();
                let expected = match user {
                    Some("alice") | Some("bob") | Some("carol") => {
                        Access::READ | Access::WRITE | Access::DELETE
                    }
                    Some(_) => Access::READ,
                    None => Access::READ,
                };
                assert_eq!(access, expected);
            }
        });
        handles.push(handle);
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn expanded_groups_are_visible_on_the_model() {
    let model = model();
    let ops = model.group_members("ops").unwrap();
    assert!(ops.contains("alice"));
    assert!(ops.contains("bob"));
    assert!(ops.contains("carol"));
    assert_eq!(model.group_names(), ["devs", "ops"]);
}
