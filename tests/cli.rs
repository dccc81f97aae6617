use assert_cmd::prelude::*;
use secp256k1::{Keypair, Message, Secp256k1};
use sha2::{Digest, Sha256};
use std::{fs, net::TcpListener, process::Command};
use tempfile::TempDir;

const NSEC: &str = "nsec1vl029mgpspedva04g90vltkh6fvh240zqtv9k0t9af8935ke9laqsnlfe5";
const NPUB: &str = "npub180cvv07tjdrrgpa0j7j7tmnyl2yr6yr7l8j4s3evf6u64th6gkwsyjh6w6";
const PUBKEY_HEX: &str = "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d";

fn nostrcast(env_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("nostrcast").unwrap();
    for var in nostrcast::config::ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.args(["--env", env_path]);
    cmd
}

fn write_env(dir: &TempDir, content: &str) -> String {
    let env_path = dir.path().join("env");
    fs::write(&env_path, content).unwrap();
    env_path.to_str().unwrap().to_string()
}

fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}")
}

fn signed_event_json() -> serde_json::Value {
    let secp = Secp256k1::new();
    let sk = [1u8; 32];
    let kp = Keypair::from_seckey_slice(&secp, &sk).unwrap();
    let pubkey = hex::encode(kp.x_only_public_key().0.serialize());
    let created_at = 1u64;
    let kind = 1u32;
    let tags: Vec<Vec<String>> = vec![];
    let arr = serde_json::json!([0, pubkey, created_at, kind, tags, ""]);
    let data = serde_json::to_vec(&arr).unwrap();
    let hash = Sha256::digest(&data);
    let id = hex::encode(hash);
    let msg = Message::from_digest_slice(&hash).unwrap();
    let sig = secp.sign_schnorr_no_aux_rand(&msg, &kp);
    serde_json::json!({
        "id": id,
        "pubkey": pubkey,
        "kind": kind,
        "created_at": created_at,
        "tags": tags,
        "content": "",
        "sig": hex::encode(sig.as_ref()),
    })
}

#[test]
fn help_lists_commands() {
    let output = Command::cargo_bin("nostrcast")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let help = String::from_utf8(output.stdout).unwrap();
    for command in ["publish", "profile", "receipt", "pubkey", "relays", "serve"] {
        assert!(help.contains(command), "missing {command} in help");
    }
}

#[test]
fn missing_env_file_is_created() {
    let dir = TempDir::new().unwrap();
    let env_path = dir.path().join("fresh.env");

    let output = nostrcast(env_path.to_str().unwrap())
        .args(["relays", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout)
        .unwrap()
        .contains("wss://relay.damus.io"));
    assert!(fs::read_to_string(&env_path)
        .unwrap()
        .contains("PUBLISH_MAX_RETRIES=3"));
}

#[test]
fn pubkey_prints_npub_and_hex() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir, &format!("NOSTR_PRIVATE_KEY={NSEC}\n"));

    let output = nostrcast(&env_path).arg("pubkey").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, [NPUB, PUBKEY_HEX]);
}

#[test]
fn relays_list_is_normalized() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir, "RELAYS=\"wss://a/, wss://b,wss://a\"\n");

    let output = nostrcast(&env_path).args(["relays", "list"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "wss://a\nwss://b\n");
}

#[test]
fn receipt_without_publish_prints_signed_receipt() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir, &format!("NOSTR_PRIVATE_KEY={NSEC}\nRELAYS=\n"));
    let request = serde_json::json!({
        "id": "de".repeat(32),
        "pubkey": "ab".repeat(32),
        "kind": 9734,
        "created_at": 1,
        "tags": [["p", "abc"], ["e", "note"], ["relays", "wss://hint"]],
        "content": "",
        "sig": "",
    });
    let request_path = dir.path().join("zap.json");
    fs::write(&request_path, request.to_string()).unwrap();

    let output = nostrcast(&env_path)
        .args([
            "receipt",
            request_path.to_str().unwrap(),
            "--bolt11",
            "lnbc10n1test",
            "--no-publish",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let receipt: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(receipt["kind"], 9735);
    assert_eq!(receipt["pubkey"], PUBKEY_HEX);
    let tags = receipt["tags"].as_array().unwrap();
    assert_eq!(tags[0], serde_json::json!(["p", "abc"]));
    assert_eq!(tags[1], serde_json::json!(["bolt11", "lnbc10n1test"]));
    assert_eq!(tags[2][0], "description");
    assert_eq!(tags[3], serde_json::json!(["e", "note"]));
}

#[test]
fn receipt_requires_payee_tag() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir, &format!("NOSTR_PRIVATE_KEY={NSEC}\nRELAYS=\n"));
    let request = serde_json::json!({
        "id": "de".repeat(32),
        "pubkey": "ab".repeat(32),
        "kind": 9734,
        "created_at": 1,
        "tags": [],
        "content": "",
        "sig": "",
    });
    let request_path = dir.path().join("zap.json");
    fs::write(&request_path, request.to_string()).unwrap();

    nostrcast(&env_path)
        .args([
            "receipt",
            request_path.to_str().unwrap(),
            "--bolt11",
            "lnbc1",
            "--no-publish",
        ])
        .assert()
        .failure();
}

#[test]
fn publish_to_unreachable_relay_fails() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir, "RELAYS=\nPUBLISH_MAX_RETRIES=1\n");
    let ev_path = dir.path().join("ev.json");
    fs::write(&ev_path, signed_event_json().to_string()).unwrap();

    let output = nostrcast(&env_path)
        .args([
            "publish",
            ev_path.to_str().unwrap(),
            "--relay",
            &closed_port_url(),
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let outcome: serde_json::Value = serde_json::from_str(stdout.lines().next().unwrap()).unwrap();
    assert_eq!(outcome["success"], false);
    assert_eq!(outcome["attempts"], 1);
}

#[test]
fn publish_rejects_tampered_event() {
    let dir = TempDir::new().unwrap();
    let env_path = write_env(&dir, "RELAYS=\n");
    let mut ev = signed_event_json();
    ev["content"] = "tampered".into();
    let ev_path = dir.path().join("ev.json");
    fs::write(&ev_path, ev.to_string()).unwrap();

    let output = nostrcast(&env_path)
        .args(["publish", ev_path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
