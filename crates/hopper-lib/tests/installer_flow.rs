use hopper_lib::game::installer::config::{Endpoints, InstallerConfig};
use hopper_lib::game::installer::core::artifact::HashAlgorithm;
use hopper_lib::game::installer::core::hashing::hash_bytes;
use hopper_lib::game::installer::manifest::InstanceManifest;
use hopper_lib::game::installer::pack::{PackFile, PackManifest, PackSide, Provenance};
use hopper_lib::game::installer::types::{
    CancelToken, InstallStage, LoaderKind, LoaderVersionSelector, Side, SilentProgressReporter,
};
use hopper_lib::game::installer::{InstallOutcome, InstallRequest, InstanceInstaller, LoaderChoice};
use hopper_lib::ErrorKind;
use serde_json::json;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

const MC: &str = "1.20.1";

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sha1(bytes: &[u8]) -> String {
    hash_bytes(bytes, HashAlgorithm::Sha1).value()
}

fn jar(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(contents).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

async fn serve_bytes(server: &MockServer, route: &str, body: Vec<u8>, times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path(route.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body));
    match times {
        Some(n) => mock.expect(n).mount(server).await,
        None => mock.mount(server).await,
    }
}

/// Version manifest, version JSON and server jar for a vanilla server install.
async fn mount_vanilla(server: &MockServer) {
    let server_jar = jar(&[(
        "META-INF/MANIFEST.MF",
        b"Manifest-Version: 1.0\r\nMain-Class: net.minecraft.bundler.Main\r\n\r\n",
    )]);
    let version_json = serde_json::to_vec(&json!({
        "id": MC,
        "mainClass": "net.minecraft.client.main.Main",
        "downloads": {
            "server": {
                "url": format!("{}/objects/server.jar", server.uri()),
                "sha1": sha1(&server_jar),
                "size": server_jar.len()
            }
        },
        "libraries": []
    }))
    .unwrap();
    let manifest = json!({
        "versions": [{
            "id": MC,
            "url": format!("{}/v1/packages/{}.json", server.uri(), MC),
            "sha1": sha1(&version_json)
        }]
    });

    serve_bytes(server, "/mc/game/version_manifest_v2.json", serde_json::to_vec(&manifest).unwrap(), None).await;
    serve_bytes(server, &format!("/v1/packages/{}.json", MC), version_json, None).await;
    serve_bytes(server, "/objects/server.jar", server_jar, None).await;
}

fn config(server: &MockServer, data_dir: &Path) -> InstallerConfig {
    let mut config = InstallerConfig::new(data_dir);
    config.endpoints = Endpoints::rebased(&server.uri());
    config.concurrency = 2;
    config
}

fn pack_file(server: &MockServer, name: &str, body: &[u8]) -> PackFile {
    PackFile {
        name: name.to_string(),
        url: format!("{}/cdn/{}", server.uri(), name),
        path: format!("mods/{}", name),
        size: Some(body.len() as u64),
        hash: Some(sha1(body).to_uppercase()),
        side: PackSide::Both,
        optional: false,
        allow_hash_failure: false,
        provenance: Provenance {
            catalog: "curseforge".to_string(),
            project_id: Some("238222".to_string()),
            file_id: Some(name.len().to_string()),
        },
    }
}

fn scratch_is_empty(data_dir: &Path) -> bool {
    match std::fs::read_dir(data_dir.join("tmp")) {
        Ok(entries) => entries.count() == 0,
        Err(_) => true,
    }
}

#[tokio::test]
async fn fabric_server_install_end_to_end() {
    init_logger();
    let server = MockServer::start().await;
    mount_vanilla(&server).await;

    let loader_jar = jar(&[("net/fabricmc/loader/Loader.class", b"\xca\xfe\xba\xbe")]);
    serve_bytes(
        &server,
        "/fabric-meta/v2/versions/loader/1.20.1",
        serde_json::to_vec(&json!([
            {"loader": {"version": "0.16.6-beta.1", "stable": false}},
            {"loader": {"version": "0.16.5", "stable": true}}
        ]))
        .unwrap(),
        None,
    )
    .await;
    serve_bytes(
        &server,
        "/fabric-meta/v2/versions/loader/1.20.1/0.16.5/server/json",
        serde_json::to_vec(&json!({
            "id": "fabric-loader-0.16.5-1.20.1",
            "inheritsFrom": MC,
            "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotServer",
            "libraries": [{
                "name": "net.fabricmc:fabric-loader:0.16.5",
                "url": format!("{}/fabric-maven/", server.uri()),
                "sha1": sha1(&loader_jar),
                "size": loader_jar.len()
            }]
        }))
        .unwrap(),
        None,
    )
    .await;
    serve_bytes(
        &server,
        "/fabric-maven/net/fabricmc/fabric-loader/0.16.5/fabric-loader-0.16.5.jar",
        loader_jar,
        Some(1),
    )
    .await;

    let present = b"already installed mod".to_vec();
    let missing = b"freshly downloaded mod".to_vec();
    serve_bytes(&server, "/cdn/present.jar", present.clone(), Some(0)).await;
    serve_bytes(&server, "/cdn/missing.jar", missing.clone(), Some(1)).await;

    let data = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("mods")).unwrap();
    std::fs::write(root.path().join("mods/present.jar"), &present).unwrap();

    let pack = PackManifest {
        name: "Test Pack".to_string(),
        version: "1.0.0".to_string(),
        files: vec![
            pack_file(&server, "present.jar", &present),
            pack_file(&server, "missing.jar", &missing),
        ],
    };
    let installer = InstanceInstaller::new(config(&server, data.path()), Arc::new(SilentProgressReporter));
    let outcome = installer
        .install(
            InstallRequest {
                root: root.path().to_path_buf(),
                minecraft_version: MC.to_string(),
                side: Side::Server,
                loader: Some(LoaderChoice {
                    kind: LoaderKind::Fabric,
                    selector: LoaderVersionSelector::Latest,
                }),
                pack: pack.clone(),
            },
            CancelToken::never(),
        )
        .await;

    let manifest = match outcome {
        InstallOutcome::Done(manifest) => manifest,
        other => panic!("install did not finish: {:?}", other),
    };
    assert_eq!(manifest.loader.as_ref().unwrap().version, "0.16.5");
    assert_eq!(manifest.main_class, "net.fabricmc.loader.impl.launch.knot.KnotServer");
    assert_eq!(manifest.server_jar.as_deref(), Some("fabric-server-launch.jar"));
    assert_eq!(manifest.mods.len(), 2);
    for (installed, declared) in manifest.mods.iter().zip(&pack.files) {
        assert_eq!(installed.hash, declared.hash);
        assert_eq!(installed.provenance, declared.provenance);
    }
    assert_eq!(std::fs::read(root.path().join("mods/missing.jar")).unwrap(), missing);

    let on_disk = InstanceManifest::read(root.path()).await.unwrap().unwrap();
    assert_eq!(on_disk.mods, manifest.mods);

    assert_eq!(
        std::fs::read_to_string(root.path().join("fabric-server-launcher.properties")).unwrap(),
        format!("serverJar=minecraft_server.{}.jar\n", MC)
    );
    let launch_jar = std::fs::File::open(root.path().join("fabric-server-launch.jar")).unwrap();
    let mut archive = zip::ZipArchive::new(launch_jar).unwrap();
    assert_eq!(archive.by_index(0).unwrap().name(), "META-INF/MANIFEST.MF");
    let mut properties = String::new();
    archive
        .by_name("fabric-server-launch.properties")
        .unwrap()
        .read_to_string(&mut properties)
        .unwrap();
    assert!(properties.contains("launch.mainClass=net.fabricmc.loader.impl.launch.knot.KnotServer"));
    assert!(archive.by_name("net/fabricmc/loader/Loader.class").is_ok());

    assert!(scratch_is_empty(data.path()));
}

#[tokio::test]
async fn optional_mod_failure_is_tolerated() {
    init_logger();
    let server = MockServer::start().await;
    mount_vanilla(&server).await;
    let body = b"required mod".to_vec();
    serve_bytes(&server, "/cdn/required.jar", body.clone(), Some(1)).await;
    Mock::given(method("GET"))
        .and(path("/cdn/shaders.zip"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut shaders = pack_file(&server, "shaders.zip", b"never served");
    shaders.optional = true;
    let data = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();

    let outcome = InstanceInstaller::new(config(&server, data.path()), Arc::new(SilentProgressReporter))
        .install(
            InstallRequest {
                root: root.path().to_path_buf(),
                minecraft_version: MC.to_string(),
                side: Side::Server,
                loader: None,
                pack: PackManifest {
                    name: "Vanilla+".to_string(),
                    version: "2".to_string(),
                    files: vec![pack_file(&server, "required.jar", &body), shaders],
                },
            },
            CancelToken::never(),
        )
        .await;

    let InstallOutcome::Done(manifest) = outcome else {
        panic!("optional failure should not fail the run");
    };
    assert_eq!(manifest.mods.len(), 1);
    assert_eq!(manifest.mods[0].name, "required.jar");
    assert_eq!(manifest.main_class, "net.minecraft.bundler.Main");
    assert_eq!(
        manifest.server_jar.as_deref(),
        Some(format!("minecraft_server.{}.jar", MC).as_str())
    );
}

#[tokio::test]
async fn failed_update_keeps_existing_instance() {
    init_logger();
    let server = MockServer::start().await;
    mount_vanilla(&server).await;
    Mock::given(method("GET"))
        .and(path("/cdn/broken.jar"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let data = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("world")).unwrap();
    std::fs::write(root.path().join("world/level.dat"), b"precious").unwrap();

    let outcome = InstanceInstaller::new(config(&server, data.path()), Arc::new(SilentProgressReporter))
        .install(
            InstallRequest {
                root: root.path().to_path_buf(),
                minecraft_version: MC.to_string(),
                side: Side::Server,
                loader: None,
                pack: PackManifest {
                    name: "Broken".to_string(),
                    version: "1".to_string(),
                    files: vec![pack_file(&server, "broken.jar", b"unused")],
                },
            },
            CancelToken::never(),
        )
        .await;

    let InstallOutcome::Failed(failure) = outcome else {
        panic!("a required mod failing must fail the run");
    };
    assert_eq!(failure.stage, InstallStage::FetchingModArtifacts);
    assert_eq!(failure.kind, ErrorKind::TransportFailure);
    assert!(failure.message.contains("broken.jar"));
    assert_eq!(std::fs::read(root.path().join("world/level.dat")).unwrap(), b"precious");
    assert!(!root.path().join("instance.json").exists());
    assert!(scratch_is_empty(data.path()));
}

#[tokio::test]
async fn unknown_minecraft_version_is_a_configuration_error() {
    init_logger();
    let server = MockServer::start().await;
    mount_vanilla(&server).await;
    let data = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();

    let outcome = InstanceInstaller::new(config(&server, data.path()), Arc::new(SilentProgressReporter))
        .install(
            InstallRequest {
                root: root.path().to_path_buf(),
                minecraft_version: "0.0.1".to_string(),
                side: Side::Client,
                loader: None,
                pack: PackManifest::default(),
            },
            CancelToken::never(),
        )
        .await;

    let InstallOutcome::Failed(failure) = outcome else {
        panic!("unknown versions must fail");
    };
    assert_eq!(failure.stage, InstallStage::ResolvingManifest);
    assert_eq!(failure.kind, ErrorKind::ConfigurationError);
}

#[tokio::test]
async fn invalid_pack_entry_fails_before_downloading() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let data = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();

    let mut escaping = pack_file(&server, "evil.jar", b"x");
    escaping.path = "../../evil.jar".to_string();
    let outcome = InstanceInstaller::new(config(&server, data.path()), Arc::new(SilentProgressReporter))
        .install(
            InstallRequest {
                root: root.path().to_path_buf(),
                minecraft_version: MC.to_string(),
                side: Side::Client,
                loader: None,
                pack: PackManifest {
                    name: "Evil".to_string(),
                    version: "1".to_string(),
                    files: vec![escaping],
                },
            },
            CancelToken::never(),
        )
        .await;

    let InstallOutcome::Failed(failure) = outcome else {
        panic!("path traversal must be rejected");
    };
    assert_eq!(failure.kind, ErrorKind::ConfigurationError);
}

#[tokio::test]
async fn cancelled_before_start_reports_cancelled() {
    init_logger();
    let server = MockServer::start().await;
    mount_vanilla(&server).await;
    let data = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();

    let (handle, token) = CancelToken::pair();
    handle.cancel();
    let outcome = InstanceInstaller::new(config(&server, data.path()), Arc::new(SilentProgressReporter))
        .install(
            InstallRequest {
                root: root.path().to_path_buf(),
                minecraft_version: MC.to_string(),
                side: Side::Server,
                loader: None,
                pack: PackManifest::default(),
            },
            token,
        )
        .await;

    assert!(matches!(
        outcome,
        InstallOutcome::Cancelled {
            stage: InstallStage::ResolvingManifest
        }
    ));
    assert!(scratch_is_empty(data.path()));
}
