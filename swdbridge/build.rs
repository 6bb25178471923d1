// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! build.rs for the swdbridge firmware

use jiff::Timestamp;
use std::path::{Path, PathBuf};
use std::{env, fs};

// Image programmed into the target, if set
const IMAGE_ENV: &str = "SWDBRIDGE_IMAGE";
const IMAGE_OUT: &str = "image.bin";

fn main() {
    println!("cargo:rerun-if-env-changed=ESP_LOG");
    println!("cargo:rerun-if-env-changed={IMAGE_ENV}");
    println!("cargo:rerun-if-changed=build.rs");

    // Same source and formatting as esp-bootloader-esp-idf, as these are
    // passed into the esp_app_desc! macro
    let build_time = Timestamp::now();
    let build_time_formatted = build_time.strftime("%H:%M:%S");
    let build_date_formatted = build_time.strftime("%Y-%m-%d");
    println!("cargo::rustc-env=SWDBRIDGE_BUILD_TIME={build_time_formatted}");
    println!("cargo::rustc-env=SWDBRIDGE_BUILD_DATE={build_date_formatted}");

    linker_be_nice();
    // make sure linkall.x is the last linker script (otherwise might cause problems with flip-link)
    println!("cargo:rustc-link-arg=-Tlinkall.x");

    built::write_built_file().expect("Failed to acquire build-time information");

    stage_image();
}

// Copies the target image into OUT_DIR, or creates an empty one, so the
// firmware can always include_bytes! it.  An empty image means identify only.
fn stage_image() {
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR not set"));
    let out_path = out_dir.join(IMAGE_OUT);

    match env::var_os(IMAGE_ENV) {
        Some(image) => {
            let image = Path::new(&image);
            println!("cargo:rerun-if-changed={}", image.display());
            fs::copy(image, &out_path)
                .unwrap_or_else(|e| panic!("Failed to copy {}: {e}", image.display()));
        }
        None => fs::write(&out_path, []).expect("Failed to create empty image"),
    }
}

fn linker_be_nice() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        let kind = &args[1];
        let what = &args[2];

        match kind.as_str() {
            "undefined-symbol" => match what.as_str() {
                "_stack_start" => {
                    eprintln!();
                    eprintln!("💡 Is the linker script `linkall.x` missing?");
                    eprintln!();
                }
                "embedded_test_linker_file_not_added_to_rustflags" => {
                    eprintln!();
                    eprintln!(
                        "💡 `embedded-test` not found - make sure `embedded-test.x` is added as a linker script for tests"
                    );
                    eprintln!();
                }
                _ => (),
            },
            // we don't have anything helpful for "missing-lib" yet
            _ => {
                std::process::exit(1);
            }
        }

        std::process::exit(0);
    }

    println!(
        "cargo:rustc-link-arg=--error-handling-script={}",
        std::env::current_exe().unwrap().display()
    );
}
