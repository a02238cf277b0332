//! Built-in scenarios
//!
//! Each builds the cowsay image on pool `layered`. They differ in builder
//! backend and whether the result is rolled out to a node.

use layercheck_common::resources::BuilderType;

use crate::options::{RolloutOptions, ScenarioOptions, DEFAULT_POOL_NAME};

/// Installs cowsay from EPEL on top of the rendered configs
pub const COWSAY_DOCKERFILE: &str = r#"FROM quay.io/centos/centos:stream9 AS centos
RUN dnf install -y epel-release
FROM configs AS final
COPY --from=centos /etc/yum.repos.d /etc/yum.repos.d
COPY --from=centos /etc/pki/rpm-gpg/RPM-GPG-KEY-* /etc/pki/rpm-gpg/
RUN sed -i 's/\$stream/9-stream/g' /etc/yum.repos.d/centos*.repo && \
    rpm-ostree install cowsay"#;

/// Output expected from the rollout verification command
pub const COWSAY_EXPECTED_OUTPUT: &str = "Moo!";

/// Build with the OpenShift image builder
pub const OPENSHIFT_IMAGE_BUILDER: &str = "openshift-image-builder";
/// Build with the custom pod builder
pub const CUSTOM_POD_BUILDER: &str = "custom-pod-builder";
/// Build, then roll out to a worker and run cowsay on it
pub const ROLLS_OUT_IMAGE: &str = "rolls-out-image";

fn cowsay(name: &str, builder: BuilderType) -> ScenarioOptions {
    ScenarioOptions::new(name, builder).with_dockerfile(DEFAULT_POOL_NAME, COWSAY_DOCKERFILE)
}

/// Command that proves cowsay is on the host image
pub fn cowsay_verify_command() -> Vec<String> {
    ["chroot", "/rootfs", "cowsay", COWSAY_EXPECTED_OUTPUT]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Every built-in scenario, in the order the suite runs them
pub fn all() -> Vec<ScenarioOptions> {
    vec![
        cowsay(OPENSHIFT_IMAGE_BUILDER, BuilderType::OpenshiftImageBuilder),
        cowsay(CUSTOM_POD_BUILDER, BuilderType::CustomPodBuilder),
        cowsay(ROLLS_OUT_IMAGE, BuilderType::OpenshiftImageBuilder).with_rollout(
            RolloutOptions {
                verify_command: cowsay_verify_command(),
                node_role: "worker".to_string(),
                delete_node_on_cleanup: true,
            },
        ),
    ]
}

/// Look up a built-in scenario by name
pub fn by_name(name: &str) -> Option<ScenarioOptions> {
    all().into_iter().find(|s| s.name == name)
}

/// Names of every built-in scenario
pub fn names() -> Vec<String> {
    all().into_iter().map(|s| s.name).collect()
}
