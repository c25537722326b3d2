//! Configuration template rendering.
//!
//! Pure text substitution: every `{{name}}` occurrence is replaced by
//! the variable's value. Unresolved placeholders pass through verbatim
//! rather than failing — downstream scripts carry literal braces in a
//! few places and rendering must not mangle them.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use skylift_cluster::ClusterNodes;
use skylift_cluster::instance_types;

use crate::deploy::DeployConfig;
use crate::error::DeployResult;

/// Ordered variable map consumed by the renderer.
pub type TemplateVars = BTreeMap<String, String>;

/// Directory names never copied into the rendered tree.
const VCS_DIRS: &[&str] = &[".git", ".svn"];

/// Substitute every known `{{name}}` placeholder in `text`.
pub fn render(text: &str, vars: &TemplateVars) -> String {
    let mut rendered = text.to_string();
    for (name, value) in vars {
        rendered = rendered.replace(&format!("{{{{{name}}}}}"), value);
    }
    rendered
}

/// Whether a file name belongs in the rendered tree. Editor droppings
/// and commented-out files stay behind.
fn deployable_file_name(name: &str) -> bool {
    let first = name.chars().next();
    !matches!(first, None | Some('#') | Some('.') | Some('~')) && !name.ends_with('~')
}

/// Render the template tree under `src_root` into `dest_root`,
/// mirroring relative paths.
pub fn render_tree(src_root: &Path, dest_root: &Path, vars: &TemplateVars) -> DeployResult<()> {
    let walker = WalkDir::new(src_root).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        !VCS_DIRS.contains(&name.as_ref())
    });

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !deployable_file_name(&name) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(src_root) else {
            continue;
        };
        let dest = dest_root.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = fs::read_to_string(entry.path())?;
        fs::write(&dest, render(&text, vars))?;
        debug!(file = %relative.display(), "rendered template");
    }
    Ok(())
}

/// Build the variable set for a cluster from its node set and options.
pub fn cluster_template_vars(nodes: &ClusterNodes, config: &DeployConfig) -> TemplateVars {
    let dns_list = |instances: &[skylift_provider::Instance]| -> String {
        instances
            .iter()
            .map(|i| i.public_dns.clone())
            .collect::<Vec<_>>()
            .join("\n")
    };
    let active_master = nodes
        .lead()
        .map(|i| i.public_dns.clone())
        .unwrap_or_default();

    let (coordinator_list, cluster_url) = if nodes.coordinators.is_empty() {
        ("NONE".to_string(), format!("{active_master}:7077"))
    } else {
        let url = format!(
            "zoo://{}",
            nodes
                .coordinators
                .iter()
                .map(|i| format!("{}:2181/mesos", i.public_dns))
                .collect::<Vec<_>>()
                .join(",")
        );
        (dns_list(&nodes.coordinators), url)
    };

    // Storage paths expand with the instance type's local disk count:
    // /mnt for the first disk, /mnt2..N for the rest.
    let disks = instance_types::local_disks(&config.instance_type);
    let multi_disk = |suffix: &str| -> String {
        let mut dirs = vec![format!("/mnt/{suffix}")];
        for disk in 2..=disks {
            dirs.push(format!("/mnt{disk}/{suffix}"));
        }
        dirs.join(",")
    };

    let mut vars = TemplateVars::new();
    vars.insert("master_list".to_string(), dns_list(&nodes.masters));
    vars.insert("active_master".to_string(), active_master);
    vars.insert("worker_list".to_string(), dns_list(&nodes.workers));
    vars.insert("coordinator_list".to_string(), coordinator_list);
    vars.insert("cluster_url".to_string(), cluster_url);
    vars.insert(
        "hdfs_data_dirs".to_string(),
        multi_disk("ephemeral-hdfs/data"),
    );
    vars.insert(
        "mapred_local_dirs".to_string(),
        multi_disk("hadoop/mrlocal"),
    );
    vars.insert("spark_local_dirs".to_string(), multi_disk("spark"));
    vars.insert("swap".to_string(), config.swap_mb.to_string());
    vars.insert("modules".to_string(), config.modules().join("\n"));
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylift_provider::{Instance, InstanceState};
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> TemplateVars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn node(dns: &str) -> Instance {
        Instance {
            id: dns.to_string(),
            public_dns: dns.to_string(),
            state: InstanceState::Running,
            tags: HashMap::new(),
        }
    }

    #[test]
    fn substitutes_known_placeholders() {
        let rendered = render(
            "master={{active_master}} swap={{swap}}",
            &vars(&[("active_master", "m1.example"), ("swap", "1024")]),
        );
        assert_eq!(rendered, "master=m1.example swap=1024");
    }

    #[test]
    fn unresolved_placeholders_pass_through() {
        let rendered = render("value={{unknownVar}}", &vars(&[("swap", "1024")]));
        assert_eq!(rendered, "value={{unknownVar}}");
    }

    #[test]
    fn rendering_is_pure() {
        let input = "a={{x}} b={{y}} c={{x}}";
        let v = vars(&[("x", "1"), ("y", "2")]);
        assert_eq!(render(input, &v), render(input, &v));
    }

    #[test]
    fn render_tree_mirrors_structure_and_skips_junk() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("conf/.svn")).unwrap();
        fs::write(src.path().join("conf/core.xml"), "url={{cluster_url}}").unwrap();
        fs::write(src.path().join("conf/core.xml~"), "backup").unwrap();
        fs::write(src.path().join("conf/#draft"), "draft").unwrap();
        fs::write(src.path().join("conf/.hidden"), "hidden").unwrap();
        fs::write(src.path().join("conf/.svn/entries"), "vcs").unwrap();

        render_tree(
            src.path(),
            dest.path(),
            &vars(&[("cluster_url", "m1:7077")]),
        )
        .unwrap();

        let rendered = fs::read_to_string(dest.path().join("conf/core.xml")).unwrap();
        assert_eq!(rendered, "url=m1:7077");
        assert!(!dest.path().join("conf/core.xml~").exists());
        assert!(!dest.path().join("conf/#draft").exists());
        assert!(!dest.path().join("conf/.hidden").exists());
        assert!(!dest.path().join("conf/.svn").exists());
    }

    #[test]
    fn cluster_vars_for_a_masters_only_url() {
        let mut nodes = ClusterNodes::default();
        nodes.masters.push(node("m1.example"));
        nodes.workers.push(node("w1.example"));
        nodes.workers.push(node("w2.example"));
        let config = DeployConfig {
            instance_type: "m1.large".to_string(),
            swap_mb: 1024,
            monitoring: false,
        };

        let vars = cluster_template_vars(&nodes, &config);
        assert_eq!(vars["active_master"], "m1.example");
        assert_eq!(vars["cluster_url"], "m1.example:7077");
        assert_eq!(vars["worker_list"], "w1.example\nw2.example");
        assert_eq!(vars["coordinator_list"], "NONE");
        // m1.large has two local disks.
        assert_eq!(
            vars["hdfs_data_dirs"],
            "/mnt/ephemeral-hdfs/data,/mnt2/ephemeral-hdfs/data"
        );
    }

    #[test]
    fn cluster_vars_prefer_a_coordinator_url() {
        let mut nodes = ClusterNodes::default();
        nodes.masters.push(node("m1.example"));
        nodes.workers.push(node("w1.example"));
        nodes.coordinators.push(node("z1.example"));
        nodes.coordinators.push(node("z2.example"));
        let config = DeployConfig {
            instance_type: "m1.small".to_string(),
            swap_mb: 512,
            monitoring: false,
        };

        let vars = cluster_template_vars(&nodes, &config);
        assert_eq!(
            vars["cluster_url"],
            "zoo://z1.example:2181/mesos,z2.example:2181/mesos"
        );
        assert_eq!(vars["coordinator_list"], "z1.example\nz2.example");
    }

    #[test]
    fn monitoring_appends_the_module() {
        let config = DeployConfig {
            instance_type: "m1.large".to_string(),
            swap_mb: 1024,
            monitoring: true,
        };
        assert!(config.modules().contains(&"ganglia".to_string()));
    }
}
