use super::*;

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
        }
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            rx_port: 849,
            tx_port: 850,
            multicast_ip: "225.100.20.15".to_string(),
            multicast_enabled: false,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            id: "aeolus".to_string(),
            channel: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            keepalive: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/var/log/aeolus".to_string(),
            backup_count: 7,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_inflight: 4,
            retries: 2,
            timeout_seconds: 4.0,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            sync: true,
            upload_period: 60,
            keepalive: 200,
            host_rtc: false,
        }
    }
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            max_drift: 5,
            period_hours: 12,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            sites: vec![
                "8.8.8.8:53".to_string(),
                "1.1.1.1:53".to_string(),
            ],
            timeout_seconds: 5,
        }
    }
}

impl Default for TodConfig {
    fn default() -> Self {
        Self {
            intervals: "20:00-20:15".to_string(),
            poweroff: false,
        }
    }
}

impl Default for AuxRelayConfig {
    fn default() -> Self {
        Self {
            mode: "Timed".to_string(),
            on: "20:00".to_string(),
            off: "20:15".to_string(),
            sync: true,
            publish: PublishConfig::default(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            sinks: vec!["mqtt".to_string()],
            what: vec!["current".to_string(), "average".to_string()],
        }
    }
}

impl Default for InstrumentsConfig {
    fn default() -> Self {
        Self {
            voltmeter: VoltmeterConfig::default(),
            anemometer: AnemometerConfig::default(),
            barometer: BarometerConfig::default(),
            cloud_sensor: CloudSensorConfig::default(),
            photometer: PhotometerConfig::default(),
            pluviometer: PluviometerConfig::default(),
            pyranometer: PyranometerConfig::default(),
            rain_sensor: RainSensorConfig::default(),
            thermometer: ThermometerConfig::default(),
            thermopile: ThermopileConfig::default(),
            watchdog: WatchdogConfig::default(),
            roof_relay: RoofRelayConfig::default(),
        }
    }
}

impl Default for VoltmeterConfig {
    fn default() -> Self {
        Self {
            sync: true,
            threshold: 11.8,
            offset: 0.0,
            delta: 0.2,
            time: 30,
            publish: PublishConfig::default(),
        }
    }
}

impl Default for AnemometerConfig {
    fn default() -> Self {
        Self {
            sync: true,
            threshold: 20,
            ave_threshold: 66,
            calibration: 36,
            model: "TX20".to_string(),
            publish: PublishConfig::default(),
        }
    }
}

impl Default for BarometerConfig {
    fn default() -> Self {
        Self {
            sync: true,
            height: 700,
            offset: -19,
            publish: PublishConfig::default(),
        }
    }
}

impl Default for CloudSensorConfig {
    fn default() -> Self {
        Self {
            sync: true,
            threshold: 67,
            gain: 1.0,
            publish: PublishConfig::default(),
        }
    }
}

impl Default for PhotometerConfig {
    fn default() -> Self {
        Self {
            sync: true,
            threshold: 10.5,
            offset: 0.0,
            publish: PublishConfig::default(),
        }
    }
}

impl Default for PluviometerConfig {
    fn default() -> Self {
        Self {
            sync: true,
            calibration: 124,
            publish: PublishConfig::default(),
        }
    }
}

impl Default for PyranometerConfig {
    fn default() -> Self {
        Self {
            sync: true,
            gain: 1.4,
            offset: 0,
            publish: PublishConfig::default(),
        }
    }
}

impl Default for RainSensorConfig {
    fn default() -> Self {
        Self {
            sync: true,
            threshold: 1,
            publish: PublishConfig::default(),
        }
    }
}

impl Default for ThermometerConfig {
    fn default() -> Self {
        Self {
            sync: true,
            delta_threshold: 5.0,
            publish: PublishConfig::default(),
        }
    }
}

impl Default for ThermopileConfig {
    fn default() -> Self {
        Self {
            publish: PublishConfig::default(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            sync: true,
            period: 200,
        }
    }
}

impl Default for RoofRelayConfig {
    fn default() -> Self {
        Self {
            publish: PublishConfig::default(),
        }
    }
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            file: String::new(),
            period: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            udp: UdpConfig::default(),
            mqtt: MqttConfig::default(),
            logging: LoggingConfig::default(),
            engine: EngineConfig::default(),
            gateway: GatewayConfig::default(),
            rtc: RtcConfig::default(),
            probe: ProbeConfig::default(),
            tod: TodConfig::default(),
            aux_relay: AuxRelayConfig::default(),
            instruments: InstrumentsConfig::default(),
            scripts: ScriptsConfig::default(),
            html: HtmlConfig::default(),
        }
    }
}
