use log::info;

use super::{repo_to_build_parameter, BuildTarget, PipelineVariableSet};
use crate::command::BuildOptions;
use crate::config::Registry;
use crate::error::Result;
use crate::release_tool::CheckoutGuard;

/// Layers whose branch follows the Yocto release of a build.
const TOOLCHAIN_LAYERS: [&str; 3] = ["poky", "meta-openembedded", "meta-raspberrypi"];

/// Device-image targets switched on together with the QEMU flag.
const HARDWARE_TARGETS: [&str; 6] = [
    "QEMUX86_64_UEFI_GRUB",
    "QEMUX86_64_BIOS_GRUB",
    "QEMUX86_64_BIOS_GRUB_GPT",
    "VEXPRESS_QEMU",
    "VEXPRESS_QEMU_FLASH",
    "VEXPRESS_QEMU_UBOOT_UEFI_GRUB",
];

/// Build-only hardware target.
const BUILD_ONLY_TARGET: &str = "BEAGLEBONEBLACK";

/// Assemble the variables of the client pipeline building `target`.
///
/// `options.pull_requests` overrides the revision of other repositories.
/// The order of the result is the order shown to people; comparisons sort it.
pub async fn assemble_variables(
    checkout: &CheckoutGuard<'_>,
    registry: &Registry,
    target: &BuildTarget,
    options: &BuildOptions,
) -> Result<PipelineVariableSet> {
    let resolver = checkout.resolver();
    let overrides = &options.pull_requests;
    let is_meta = registry.is_meta(&target.repo);
    let is_integration = registry.is_integration(&target.repo);
    let integration_version = format!("origin/{}", target.base_branch);

    let listed_in = if is_meta {
        format!("origin/{}", registry.trunk_branch)
    } else {
        integration_version.clone()
    };
    let versioned = resolver.versioned_repositories(&listed_in).await?;

    let mut vars = PipelineVariableSet::new();

    // The meta layer builds with the defaults of every other repository
    if !is_meta {
        for repo in versioned
            .iter()
            .filter(|r| **r != target.repo && !registry.is_integration(r))
        {
            let revision = match overrides.get(repo) {
                Some(revision) => revision.clone(),
                None => {
                    let version = resolver.version_of(repo, &integration_version).await?;
                    info!(
                        "{repo} version {version} is being used in {}",
                        target.base_branch
                    );
                    version
                }
            };
            vars.set(repo_to_build_parameter(repo), revision);
        }
    }

    let meta_override = overrides.get(&registry.meta_repo);
    if !is_integration && !is_meta {
        let integration_revision = overrides
            .get(&registry.integration_repo)
            .unwrap_or(&target.base_branch);
        vars.set(
            repo_to_build_parameter(&registry.integration_repo),
            integration_revision.as_str(),
        );
        if let Some(revision) = meta_override {
            vars.set(
                repo_to_build_parameter(&registry.meta_repo),
                revision.as_str(),
            );
        }
    }

    // Trunk builds inherit the pipeline's own layer defaults
    if target.base_branch != registry.trunk_branch {
        let layer_branch = if is_meta {
            target.base_branch.as_str()
        } else {
            if meta_override.is_none() {
                vars.set(
                    repo_to_build_parameter(&registry.meta_repo),
                    registry.latest_stable_toolchain.as_str(),
                );
            }
            registry.latest_stable_toolchain.as_str()
        };
        for layer in TOOLCHAIN_LAYERS {
            vars.set(repo_to_build_parameter(layer), layer_branch);
        }
    }

    vars.set(
        "RUN_INTEGRATION_TESTS",
        if options.fast { "false" } else { "true" },
    );
    vars.set(
        repo_to_build_parameter(&target.repo),
        format!("pull/{}/head", target.pr),
    );

    let qemu = if target.qemu { "true" } else { "" };
    for hardware in HARDWARE_TARGETS {
        vars.set(format!("BUILD_{hardware}"), qemu);
        vars.set(format!("TEST_{hardware}"), qemu);
    }
    vars.set(format!("BUILD_{BUILD_ONLY_TARGET}"), qemu);

    vars.set(
        "BUILD_CLIENT",
        if registry.needs_qemu(&target.repo) { "true" } else { "false" },
    );

    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release_tool::testing::FakeResolver;
    use crate::release_tool::IntegrationCheckout;
    use indexmap::IndexMap;
    use std::sync::Arc;

    fn target(repo: &str, base_branch: &str, qemu: bool) -> BuildTarget {
        BuildTarget {
            repo: repo.into(),
            pr: 42,
            base_branch: base_branch.into(),
            commit_sha: "c0ffee".into(),
            qemu,
        }
    }

    fn resolver() -> FakeResolver {
        FakeResolver::new()
            .with_repositories(
                "origin/master",
                &["integration", "mender", "deviceauth", "mender-connect"],
            )
            .with_repositories("origin/3.7.x", &["integration", "mender", "deviceauth"])
            .with_version("mender", "origin/master", "master")
            .with_version("deviceauth", "origin/master", "master")
            .with_version("mender-connect", "origin/master", "master")
            .with_version("mender", "origin/3.7.x", "4.0.x")
            .with_version("deviceauth", "origin/3.7.x", "1.8.x")
    }

    async fn assemble(
        resolver: FakeResolver,
        target: &BuildTarget,
        options: &BuildOptions,
    ) -> PipelineVariableSet {
        let checkout = IntegrationCheckout::new(Arc::new(resolver));
        let guard = checkout.lock().await;
        assemble_variables(&guard, &Registry::default(), target, options)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_client_build_on_master() {
        let vars = assemble(
            resolver(),
            &target("mender", "master", true),
            &BuildOptions::default(),
        )
        .await;

        let keys: Vec<_> = vars.iter().map(|(k, _)| k).collect();
        assert_eq!(
            &keys[..6],
            &[
                "DEVICEAUTH_REV",
                "MENDER_CONNECT_REV",
                "INTEGRATION_REV",
                "RUN_INTEGRATION_TESTS",
                "MENDER_REV",
                "BUILD_QEMUX86_64_UEFI_GRUB",
            ]
        );
        assert_eq!(vars.get("DEVICEAUTH_REV"), Some("master"));
        assert_eq!(vars.get("INTEGRATION_REV"), Some("master"));
        assert_eq!(vars.get("MENDER_REV"), Some("pull/42/head"));
        assert_eq!(vars.get("RUN_INTEGRATION_TESTS"), Some("true"));
        assert_eq!(vars.get("TEST_VEXPRESS_QEMU_FLASH"), Some("true"));
        assert_eq!(vars.get("BUILD_BEAGLEBONEBLACK"), Some("true"));
        assert_eq!(vars.get("BUILD_CLIENT"), Some("true"));
        assert!(!vars.contains("POKY_REV"));
        assert!(!vars.contains("META_MENDER_REV"));
    }

    #[tokio::test]
    async fn test_release_branch_pins_toolchain() {
        let vars = assemble(
            resolver(),
            &target("deviceauth", "3.7.x", false),
            &BuildOptions::default(),
        )
        .await;

        assert_eq!(vars.get("MENDER_REV"), Some("4.0.x"));
        assert_eq!(vars.get("INTEGRATION_REV"), Some("3.7.x"));
        assert_eq!(vars.get("META_MENDER_REV"), Some("scarthgap"));
        assert_eq!(vars.get("POKY_REV"), Some("scarthgap"));
        assert_eq!(vars.get("META_OPENEMBEDDED_REV"), Some("scarthgap"));
        assert_eq!(vars.get("META_RASPBERRYPI_REV"), Some("scarthgap"));
        assert_eq!(vars.get("DEVICEAUTH_REV"), Some("pull/42/head"));
        // without QEMU the hardware flags are empty, not "false"
        assert_eq!(vars.get("BUILD_QEMUX86_64_BIOS_GRUB"), Some(""));
        assert_eq!(vars.get("BUILD_CLIENT"), Some("false"));
    }

    #[tokio::test]
    async fn test_meta_layer_uses_its_own_branch_and_no_pins() {
        let vars = assemble(
            resolver(),
            &target("meta-mender", "kirkstone", true),
            &BuildOptions::default(),
        )
        .await;

        assert!(!vars.contains("MENDER_REV"));
        assert!(!vars.contains("INTEGRATION_REV"));
        assert_eq!(vars.get("META_MENDER_REV"), Some("pull/42/head"));
        assert_eq!(vars.get("POKY_REV"), Some("kirkstone"));
        assert_eq!(vars.get("META_RASPBERRYPI_REV"), Some("kirkstone"));
    }

    #[tokio::test]
    async fn test_overrides_replace_resolved_revisions() {
        let options = BuildOptions {
            fast: true,
            pull_requests: IndexMap::from([
                ("deviceauth".to_string(), "pull/9/head".to_string()),
                ("integration".to_string(), "pull/3/head".to_string()),
                ("meta-mender".to_string(), "pull/5/head".to_string()),
            ]),
        };
        let vars = assemble(resolver(), &target("mender", "3.7.x", true), &options).await;

        assert_eq!(vars.get("DEVICEAUTH_REV"), Some("pull/9/head"));
        assert_eq!(vars.get("INTEGRATION_REV"), Some("pull/3/head"));
        assert_eq!(vars.get("META_MENDER_REV"), Some("pull/5/head"));
        assert_eq!(vars.get("POKY_REV"), Some("scarthgap"));
        assert_eq!(vars.get("RUN_INTEGRATION_TESTS"), Some("false"));
    }

    #[tokio::test]
    async fn test_unresolvable_revision_is_an_error() {
        let resolver = FakeResolver::new().with_repositories("origin/3.7.x", &["unknown"]);
        let checkout = IntegrationCheckout::new(Arc::new(resolver));
        let guard = checkout.lock().await;

        let result = assemble_variables(
            &guard,
            &Registry::default(),
            &target("mender", "3.7.x", true),
            &BuildOptions::default(),
        )
        .await;
        assert!(result.is_err());
    }
}
