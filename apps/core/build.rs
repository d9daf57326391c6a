fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "windows" {
        return;
    }

    let icon_path = std::env::var("SEARCHYTHING_ICON").unwrap_or_else(|_| "../assets/searchything.ico".to_string());
    println!("cargo:rerun-if-env-changed=SEARCHYTHING_ICON");
    println!("cargo:rerun-if-changed={icon_path}");

    let mut res = winres::WindowsResource::new();
    res.set("FileDescription", "Searchything quick launcher")
        .set("ProductName", "Searchything")
        .set("OriginalFilename", "searchything.exe");

    if std::path::Path::new(&icon_path).exists() {
        res.set_icon(&icon_path);
    } else {
        println!("cargo:warning=searchything-core: no icon at {icon_path}; building without one");
    }

    if let Err(error) = res.compile() {
        panic!("failed to compile Windows resources: {error}");
    }
}
