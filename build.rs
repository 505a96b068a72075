fn main() {
    #[cfg(feature = "adqapi")]
    adqapi::generate_bindings();
}

#[cfg(feature = "adqapi")]
mod adqapi {
    use std::{env, path::PathBuf};

    pub fn generate_bindings() {
        println!("cargo:rerun-if-changed=wrapper.h");
        println!("cargo:rerun-if-env-changed=ADQAPI_INCLUDE_DIR");
        println!("cargo:rerun-if-env-changed=ADQAPI_LIB_DIR");

        if let Ok(lib_dir) = env::var("ADQAPI_LIB_DIR") {
            println!("cargo:rustc-link-search=native={lib_dir}");
        }
        println!("cargo:rustc-link-lib=adq");

        let include_dir =
            env::var("ADQAPI_INCLUDE_DIR").unwrap_or_else(|_| "/usr/include/adq".to_string());

        let bindings = bindgen::Builder::default()
            .header("wrapper.h")
            .clang_arg(format!("-I{include_dir}"))
            .allowlist_function("ADQ_.*|ADQAPI_.*|ADQControlUnit_.*")
            .allowlist_function("CreateADQControlUnit|DeleteADQControlUnit")
            .allowlist_var("ADQ_.*|LOG_LEVEL_.*")
            .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
            .generate()
            .expect("unable to generate ADQAPI bindings");

        let out_path = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
        bindings
            .write_to_file(out_path.join("bindings.rs"))
            .expect("couldn't write ADQAPI bindings");
    }
}
