//! Resolution tests against a fixed set of roots.
//!
//! install = /I, data = /D, runtime = /R throughout.

use std::path::PathBuf;

use proptest::prelude::*;
use rstest::{fixture, rstest};
use steam_xdg_paths::{Redirector, Roots, is_protected, lookup_alias, normalize};

#[fixture]
fn redirector() -> Redirector {
    Redirector::new(Roots::new("/I", "/D", "/R").unwrap())
}

fn resolved(r: &Redirector, path: &str) -> Option<String> {
    r.resolve(path).map(|p| p.display().to_string())
}

// =============================================================================
// RULE TABLE
// =============================================================================

#[rstest]
#[case::registry("/registry.vdf", "/D/config/registry.vdf")]
#[case::starting("/starting", "/D/starting")]
#[case::steam_config("/steam.config", "/D/config/steam.config")]
#[case::pid("/steam.pid", "/R/steam.pid")]
#[case::pipe("/steam.pipe", "/R/steam.pipe")]
#[case::token("/steam.token", "/R/steam.token")]
#[case::crash("/root/.crash", "/D/config/.crash")]
#[case::forceupdate("/root/.forceupdate", "/D/config/.forceupdate")]
#[case::appcache("/root/appcache", "/D/appcache")]
#[case::compat_tools("/root/compatibilitytools.d", "/D/compatibilitytools.d")]
#[case::config("/root/config", "/D/config")]
#[case::depotcache("/root/depotcache", "/D/depotcache")]
#[case::logs("/root/logs", "/D/logs")]
#[case::music("/root/music", "/D/music")]
#[case::shader_cache("/root/shader_cache", "/D/shader_cache")]
#[case::steamapps("/root/steamapps", "/D/steamapps")]
#[case::update_hosts("/root/update_hosts_cached.vdf", "/D/config/update_hosts_cached.vdf")]
#[case::userdata("/root/userdata", "/D/userdata")]
fn every_rule_lands_in_its_base(redirector: Redirector, #[case] path: &str, #[case] expected: &str) {
    assert_eq!(resolved(&redirector, path).as_deref(), Some(expected));
}

#[rstest]
#[case::config_file("/root/config/loginusers.vdf", "/D/config/loginusers.vdf")]
#[case::nested("/root/steamapps/common/Game/game.bin", "/D/steamapps/common/Game/game.bin")]
#[case::userdata_deep("/root/userdata/1/7/remote", "/D/userdata/1/7/remote")]
#[case::registry_suffix("/registry.vdf.bak", "/D/config/registry.vdf.bak")]
#[case::byte_prefix("/root/configfoo", "/D/configfoo")]
#[case::byte_prefix_logs("/root/logs2/x", "/D/logs2/x")]
fn prefix_rules_carry_the_remainder(redirector: Redirector, #[case] path: &str, #[case] expected: &str) {
    assert_eq!(resolved(&redirector, path).as_deref(), Some(expected));
}

#[rstest]
#[case::pid_suffix("/steam.pidx", None)]
#[case::pid_child("/steam.pid/x", None)]
#[case::starting_suffix("/startingx", None)]
#[case::crash_child("/root/.crash/x", Some("/I/.crash/x"))]
#[case::crash_suffix("/root/.crashed", Some("/I/.crashed"))]
fn exact_rules_need_the_whole_path(
    redirector: Redirector,
    #[case] path: &str,
    #[case] expected: Option<&str>,
) {
    assert_eq!(resolved(&redirector, path).as_deref(), expected);
}

// =============================================================================
// INSTALL FALLBACK AND UNRESOLVABLE PATHS
// =============================================================================

#[rstest]
#[case::steam_root("/root", "/I")]
#[case::steam_root_slash("/root/", "/I")]
#[case::binary("/root/steam.sh", "/I/steam.sh")]
#[case::ubuntu("/root/ubuntu12_32/steam", "/I/ubuntu12_32/steam")]
#[case::dot_segments("/root/./a/../b", "/I/b")]
#[case::double_slash("//root//a", "/I/a")]
fn other_root_paths_land_in_install(redirector: Redirector, #[case] path: &str, #[case] expected: &str) {
    assert_eq!(resolved(&redirector, path).as_deref(), Some(expected));
}

#[rstest]
#[case::mount_root("/")]
#[case::alias_bin("/bin")]
#[case::alias_steam("/steam")]
#[case::unknown("/etc/passwd")]
#[case::near_miss("/rootfs")]
#[case::escape_from_redirect("/root/config/../../etc")]
#[case::escape_from_root("/root/../etc/passwd")]
fn unresolvable(redirector: Redirector, #[case] path: &str) {
    assert_eq!(redirector.resolve(path), None);
}

#[rstest]
fn escape_attempt_snaps_back_inside(redirector: Redirector) {
    // Climbing above `/` is discarded, so this is just /root/config.
    assert_eq!(
        resolved(&redirector, "/../../root/config").as_deref(),
        Some("/D/config")
    );
}

#[rstest]
#[case::plain("a/b", "a/b")]
#[case::dotted("./a/../b", "b")]
#[case::parent("../x", "../x")]
fn relative_paths_pass_through_normalized(
    redirector: Redirector,
    #[case] path: &str,
    #[case] expected: &str,
) {
    assert_eq!(redirector.resolve(path), Some(PathBuf::from(expected)));
}

// =============================================================================
// ALIASES AND SKELETON
// =============================================================================

#[rstest]
fn alias_targets_resolve_through_the_table(redirector: Redirector) {
    let target = lookup_alias("/bin32", true).unwrap();
    assert_eq!(resolved(&redirector, target).as_deref(), Some("/I/ubuntu12_32"));

    let target = lookup_alias("/steam", true).unwrap();
    assert_eq!(resolved(&redirector, target).as_deref(), Some("/I"));
}

#[rstest]
fn bin_alias_chains_to_another_alias() {
    let first = lookup_alias("/bin", true).unwrap();
    assert_eq!(lookup_alias(first, true), Some("/root/ubuntu12_32"));
}

#[rstest]
fn redirected_paths_are_not_protected() {
    assert!(is_protected("/root"));
    assert!(!is_protected("/root/config"));
    assert!(!is_protected("/steam.pid"));
}

// =============================================================================
// PROPERTIES
// =============================================================================

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("root".to_string()),
        Just("config".to_string()),
        Just("steamapps".to_string()),
        Just("..".to_string()),
        Just(".".to_string()),
        "[a-z]{1,6}",
    ]
}

proptest! {
    #[test]
    fn results_stay_inside_the_roots(segments in prop::collection::vec(segment(), 0..8)) {
        let redirector = Redirector::new(Roots::new("/I", "/D", "/R").unwrap());
        let path = format!("/{}", segments.join("/"));
        if let Some(real) = redirector.resolve(&path) {
            prop_assert!(
                real.starts_with("/I") || real.starts_with("/D") || real.starts_with("/R"),
                "{path} -> {}", real.display()
            );
        }
    }

    #[test]
    fn equivalent_spellings_resolve_alike(segments in prop::collection::vec(segment(), 0..8)) {
        let redirector = Redirector::new(Roots::new("/I", "/D", "/R").unwrap());
        let path = format!("/{}", segments.join("/"));
        prop_assert_eq!(redirector.resolve(&path), redirector.resolve(normalize(&path)));
    }
}
