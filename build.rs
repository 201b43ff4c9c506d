use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    playback: Playback,
    decoder: Decoder,
}

#[derive(Deserialize)]
struct Playback {
    device: String,
    sample_rate: u32,
    channels: u32,
    period_size: usize,
    volume: f32,
    position: f32,
}

#[derive(Deserialize)]
struct Decoder {
    buffer_size: usize,
    check_validity: bool,
    stream_buffer_size: usize,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    // 播放设备配置
    println!("cargo:rustc-env=PLAYBACK_DEVICE={}", config.playback.device);
    println!("cargo:rustc-env=PLAYBACK_SAMPLE_RATE={}", config.playback.sample_rate);
    println!("cargo:rustc-env=PLAYBACK_CHANNELS={}", config.playback.channels);
    println!("cargo:rustc-env=PLAYBACK_PERIOD_SIZE={}", config.playback.period_size);
    println!("cargo:rustc-env=PLAYBACK_VOLUME={}", config.playback.volume);
    println!("cargo:rustc-env=PLAYBACK_POSITION={}", config.playback.position);

    // 解码配置
    println!("cargo:rustc-env=DECODER_BUFFER_SIZE={}", config.decoder.buffer_size);
    println!("cargo:rustc-env=DECODER_CHECK_VALIDITY={}", config.decoder.check_validity);
    println!(
        "cargo:rustc-env=DECODER_STREAM_BUFFER_SIZE={}",
        config.decoder.stream_buffer_size
    );

    link_speexdsp();
}

fn link_speexdsp() {
    let target = std::env::var("TARGET").unwrap_or_default();

    if target.contains("musl") {
        // musl 目标：使用手动编译的静态库，不依赖 pkg-config
        if let Ok(sysroot) = std::env::var("MUSL_SYSROOT") {
            println!("cargo:rustc-link-search=native={}/usr/lib", sysroot);
        }
        println!("cargo:rustc-link-lib=static=speexdsp");
        return;
    }

    // GNU 目标：ALSA 动态链接（由 alsa-sys 自动处理），speexdsp 通过 pkg-config 查找
    pkg_config::Config::new()
        .probe("speexdsp")
        .expect("Failed to find speexdsp. Please install libspeexdsp-dev.");
}
