// src/deploy/git.rs

//! Attaches cloned git repositories to a pod spec.

use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, PodSpec, Volume, VolumeMount,
};

use crate::config::GitRepoSpec;

/// Image used by the clone init containers.
pub const GIT_IMAGE: &str = "alpine/git:latest";

/// Add, for every repo in order, one clone init container, one `emptyDir`
/// volume, and one mount of that volume on every regular container already
/// in `spec`.
///
/// Applying the same repos twice duplicates the entries; call this exactly
/// once per pod spec.
pub fn attach_repos(spec: &mut PodSpec, repos: &[GitRepoSpec]) {
    if repos.is_empty() {
        return;
    }

    let volumes = spec.volumes.get_or_insert_with(Vec::new);
    let init_containers = spec.init_containers.get_or_insert_with(Vec::new);

    for repo in repos {
        let volume_name = volume_name(repo);
        let mount = VolumeMount {
            name: volume_name.clone(),
            mount_path: repo.mount_path.clone(),
            ..Default::default()
        };

        volumes.push(Volume {
            name: volume_name,
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
        init_containers.push(clone_container(repo, mount.clone()));

        for container in spec.containers.iter_mut() {
            container
                .volume_mounts
                .get_or_insert_with(Vec::new)
                .push(mount.clone());
        }
    }
}

fn volume_name(repo: &GitRepoSpec) -> String {
    format!("repo-{}", repo.name)
}

fn clone_container(repo: &GitRepoSpec, mount: VolumeMount) -> Container {
    let mut args = vec!["clone".to_string()];
    if let Some(branch) = repo.branch.as_deref().filter(|b| !b.is_empty()) {
        args.push("--single-branch".to_string());
        args.push("--branch".to_string());
        args.push(branch.to_string());
    }
    args.push(repo.url.clone());
    args.push(repo.mount_path.clone());

    Container {
        name: format!("clone-{}", repo.name),
        image: Some(GIT_IMAGE.to_string()),
        command: Some(vec!["git".to_string()]),
        args: Some(args),
        volume_mounts: Some(vec![mount]),
        ..Default::default()
    }
}
