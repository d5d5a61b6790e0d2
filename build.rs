fn main() {
    let lib = pkg_config::Config::new()
        .atleast_version("0.9")
        .probe("libvncserver")
        .expect(
            "libvncserver development files not found (install libvncserver-dev or equivalent)",
        );

    let mut shim = cc::Build::new();
    shim.file("src/rfb/shim.c");
    for path in &lib.include_paths {
        shim.include(path);
    }
    shim.compile("wvnc_rfb_shim");

    println!("cargo:rerun-if-changed=src/rfb/shim.c");
    println!("cargo:rerun-if-changed=src/rfb/shim.h");
}
