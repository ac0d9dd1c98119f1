use assert_fs::prelude::*;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use wildfly_runner::deploy::{self, Archiver, WebappKind};
use wildfly_runner::error::{Error, Result};
use wildfly_runner::{RunnerConfig, WildflyRunner};

/// Writes an empty archive and remembers the request.
#[derive(Default)]
struct FakeArchiver {
    packaged: Mutex<Vec<(PathBuf, String)>>,
}

#[async_trait]
impl Archiver for FakeArchiver {
    async fn package(&self, folder: &Path, name: &str) -> Result<PathBuf> {
        self.packaged
            .lock()
            .unwrap()
            .push((folder.to_path_buf(), name.to_string()));
        let archive = folder.join(format!("{}.war", name));
        tokio::fs::write(&archive, b"PK").await?;
        Ok(archive)
    }
}

#[tokio::test]
async fn test_deploy_replaces_previous_artifacts() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let deployments = temp.child("standalone/deployments");
    deployments.child("old.war").write_binary(b"PK").unwrap();
    deployments.child("old.war.deployed").touch().unwrap();
    let war = temp.child("target/app.war");
    war.write_binary(b"PK-app").unwrap();

    let deployed = deploy::deploy_war(deployments.path(), war.path()).await?;

    assert_eq!(deployed, deployments.path().join("app.war"));
    let entries: Vec<_> = std::fs::read_dir(deployments.path())?
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["app.war"]);
    deployments.child("app.war").assert("PK-app");
    Ok(())
}

#[tokio::test]
async fn test_redeploy_from_deployments_dir() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let deployments = temp.child("standalone/deployments");
    deployments.child("app.war").write_binary(b"PK-app").unwrap();
    deployments.child("app.war.deployed").touch().unwrap();

    let deployed = deploy::deploy_war(deployments.path(), &deployments.path().join("app.war")).await?;

    assert_eq!(deployed, deployments.path().join("app.war"));
    deployments.child("app.war").assert("PK-app");
    assert_eq!(deploy::list_deployments(deployments.path()).await?, vec![deployed]);
    assert_eq!(std::fs::read_dir(deployments.path())?.count(), 1);
    // Nothing is left staged next to the directory.
    assert_eq!(std::fs::read_dir(temp.child("standalone").path())?.count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_only_war_files_deploy() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let exploded = temp.child("exploded");
    exploded.child("WEB-INF/web.xml").write_str("<web-app/>").unwrap();

    assert_eq!(deploy::validate_webapp(exploded.path()).await?, WebappKind::Exploded);
    let result = deploy::deploy_war(&temp.path().join("deployments"), exploded.path()).await;
    assert!(matches!(result, Err(Error::InvalidArtifact(_))));
    Ok(())
}

#[tokio::test]
async fn test_list_and_delete_deployments() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let deployments = temp.child("deployments");
    assert!(deploy::list_deployments(deployments.path()).await?.is_empty());

    deployments.child("b.war").write_binary(b"PK").unwrap();
    deployments.child("a.WAR").write_binary(b"PK").unwrap();
    deployments.child("README.txt").write_str("x").unwrap();

    let listed = deploy::list_deployments(deployments.path()).await?;
    assert_eq!(
        listed,
        vec![deployments.path().join("a.WAR"), deployments.path().join("b.war")]
    );

    assert!(deploy::delete_deployment(deployments.path(), "b").await?);
    assert!(!deploy::delete_deployment(deployments.path(), "b.war").await?);
    assert_eq!(deploy::list_deployments(deployments.path()).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_delete_stays_inside_deployments() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let deployments = temp.child("wildfly/srvA/standalone/deployments");
    deployments.create_dir_all().unwrap();
    temp.child("servers.json").write_str("[]").unwrap();
    temp.child("wildfly/srvA/standalone/app.war").write_binary(b"PK").unwrap();

    for name in ["../../../servers.json", "../app.war", "/tmp/app.war", "..", ""] {
        assert!(
            matches!(
                deploy::delete_deployment(deployments.path(), name).await,
                Err(Error::InvalidArtifact(_))
            ),
            "{name}"
        );
    }
    temp.child("servers.json").assert("[]");
    temp.child("wildfly/srvA/standalone/app.war").assert("PK");
    Ok(())
}

#[test]
fn test_package_file_name() -> Result<()> {
    assert_eq!(deploy::package_file_name("shop")?, PathBuf::from("shop.war"));
    assert_eq!(deploy::package_file_name("shop.WAR")?, PathBuf::from("shop.WAR"));
    assert_eq!(deploy::package_file_name("shop.v2")?, PathBuf::from("shop.v2.war"));
    assert!(matches!(deploy::package_file_name("a/b.war"), Err(Error::InvalidArtifact(_))));
    assert!(matches!(deploy::package_file_name("a\\b"), Err(Error::InvalidArtifact(_))));
    Ok(())
}

#[tokio::test]
async fn test_package_folders() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let shop = temp.child("shop");
    let blog = temp.child("blog");
    shop.create_dir_all().unwrap();
    blog.create_dir_all().unwrap();

    let archiver = Arc::new(FakeArchiver::default());
    let runner = WildflyRunner::new(RunnerConfig::new(temp.path().join("storage")))?
        .with_archiver(archiver.clone());

    let packages = runner
        .package_folders(&[shop.path().to_path_buf(), blog.path().to_path_buf()])
        .await?;

    assert_eq!(
        packages,
        vec![shop.path().join("shop.war"), blog.path().join("blog.war")]
    );
    assert_eq!(archiver.packaged.lock().unwrap().len(), 2);
    shop.child("shop.war").assert("PK");
    Ok(())
}

#[tokio::test]
async fn test_server_files_of_unknown_server() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let runner = WildflyRunner::new(RunnerConfig::new(temp.path()))?;

    assert!(matches!(
        runner.list_deployments("ghost").await,
        Err(Error::ServerNotFound(_))
    ));
    assert!(matches!(
        runner.server_config_file("ghost").await,
        Err(Error::ServerNotFound(_))
    ));
    Ok(())
}
