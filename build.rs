use std::env;
use std::path::PathBuf;

fn main() {
    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let config = cbindgen::Config::from_file("cbindgen.toml").unwrap_or_default();

    if let Ok(bindings) = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        bindings.write_to_file(format!("{}/include/mvcam.h", crate_dir));
    }

    println!("cargo:rerun-if-env-changed=MVCAM_SDK_LIB");
    if env::var_os("CARGO_FEATURE_HIKVISION").is_some() {
        // MVS installs its runtime under /opt/MVS/lib/<arch>.
        let lib = env::var("MVCAM_SDK_LIB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/opt/MVS/lib/64"));
        if !lib.join("libMvCameraControl.so").exists() {
            println!(
                "cargo:warning=libMvCameraControl.so not found in {}, set MVCAM_SDK_LIB",
                lib.display()
            );
        }
        println!("cargo:rustc-link-search=native={}", lib.display());
        println!("cargo:rustc-link-arg=-Wl,-rpath,{}", lib.display());
        println!("cargo:rustc-link-lib=dylib=MvCameraControl");
    }
}
