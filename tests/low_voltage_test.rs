//! Low supply voltage raises the alarm once the sliding window fills, and
//! the script launcher honors the Once mode.

mod common;

use aeolus::config::{AuxRelayConfig, InstrumentsConfig, ScriptEntry, ScriptsConfig};
use aeolus::instruments::{AlarmEvent, InstrumentBank};
use aeolus::protocol::bulletin::decode_bulletin;
use aeolus::scripts::Notifier;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

fn recorder_script(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let out = dir.join("args.txt");
    let script = dir.join("record.sh");
    std::fs::write(
        &script,
        format!("#!/bin/sh\necho \"$@\" >> {}\n", out.display()),
    )
    .unwrap();
    let mut perms = std::fs::metadata(&script).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script, perms).unwrap();
    (script, out)
}

#[tokio::test]
async fn one_launch_with_expected_argv() {
    let dir = tempfile::tempdir().unwrap();
    let (script, out) = recorder_script(dir.path());

    let mut bank =
        InstrumentBank::from_config(&InstrumentsConfig::default(), &AuxRelayConfig::default())
            .unwrap();
    let mut notifier = Notifier::from_config(&ScriptsConfig {
        low_voltage: ScriptEntry {
            path: script.display().to_string(),
            mode: Some("Once".to_string()),
        },
        ..Default::default()
    })
    .unwrap();

    // Thirty bulletins at 11.8 V against threshold 11.8 + delta 0.2
    let mut launches = 0;
    for _ in 0..30 {
        let frame = common::current_bulletin(11.8);
        let (reading, _, _) = decode_bulletin(&frame).unwrap();
        for alarm in bank.update(&reading) {
            if let AlarmEvent::LowVoltage {
                average,
                threshold,
                samples,
            } = alarm
            {
                if notifier.on_low_voltage(average, threshold, samples) {
                    launches += 1;
                }
            }
        }
    }
    assert_eq!(launches, 1);

    // Give the child a moment to write its argv
    for _ in 0..50 {
        if out.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let recorded = std::fs::read_to_string(&out).unwrap();
    assert_eq!(recorded.trim(), "-v 11.80 -t 12.00 -s 30");
    assert_eq!(recorded.lines().count(), 1);
}

#[tokio::test]
async fn repeated_alarms_do_not_relaunch_in_once_mode() {
    let dir = tempfile::tempdir().unwrap();
    let (script, _out) = recorder_script(dir.path());

    let mut notifier = Notifier::from_config(&ScriptsConfig {
        low_voltage: ScriptEntry {
            path: script.display().to_string(),
            mode: Some("Once".to_string()),
        },
        ..Default::default()
    })
    .unwrap();

    assert!(notifier.on_low_voltage(11.8, 12.0, 30));
    assert!(!notifier.on_low_voltage(11.7, 12.0, 30));
    assert!(!notifier.on_low_voltage(11.6, 12.0, 30));
}
