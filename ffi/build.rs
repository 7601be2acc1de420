use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src");

    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let Ok(out_dir) = env::var("OUT_DIR") else {
        return;
    };
    let header = PathBuf::from(out_dir).join("bson_request.h");

    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("BSON_REQUEST_H")
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(&header);
        }
        // A header failure must not break the Rust build.
        Err(err) => println!("cargo:warning=cbindgen failed: {err}"),
    }
}
