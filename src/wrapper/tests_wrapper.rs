use std::path::PathBuf;

use super::*;
use crate::test_utils::config;
use crate::toolchain::{CompilerVersion, PointerWidth};

fn clang_14() -> ToolchainInfo {
    ToolchainInfo {
        compiler_version: CompilerVersion::new(14, 0, 6),
        libc_version: None,
        pointer_width: PointerWidth::Bits64,
        sanitizer_runtime_dir: None,
    }
}

fn values<'a>(config: &'a Config, toolchain: &'a ToolchainInfo, archive: Option<&'a [u8]>) -> WrapperValues<'a> {
    WrapperValues {
        config,
        toolchain,
        driver_path: "/usr/local/bin/dcc".to_string(),
        archive,
    }
}

#[test]
fn test_template_and_fields_agree() {
    let placeholders: HashSet<&str> = PLACEHOLDER_RE
        .captures_iter(TEMPLATE)
        .map(|c| c.get(1).map_or("", |m| m.as_str()))
        .collect();
    for field in TemplateField::ALL {
        assert!(placeholders.contains(field.name()), "{} unused", field.name());
    }
    for name in placeholders {
        assert!(TemplateField::from_name(name).is_some(), "{name} undeclared");
    }
}

#[test]
fn test_render_resolves_everything() {
    let config = config(&["prog.c"]);
    let toolchain = clang_14();
    let source = wrapper_source(&values(&config, &toolchain, None)).unwrap();
    assert!(!source.contains("__DCC_"));
    assert!(source.contains(r#"setenvd("DCC_SANITIZER", "address");"#));
    assert!(source.contains(r#"setenvd("DCC_PATH", "/usr/local/bin/dcc");"#));
    assert!(source.contains(r#"setenvd("DCC_CLANG_VERSION", "14.0");"#));
    assert!(source.contains("#if 1 && 14 >= 6"));
    assert!(source.contains("detect_leaks=0"));
}

#[test]
fn test_no_archive_without_embedding() {
    let config = config(&["--no-embed-source", "prog.c"]);
    let toolchain = clang_14();
    let source = wrapper_source(&values(&config, &toolchain, None)).unwrap();
    assert!(!source.contains("static unsigned char tar_data[]"));
    assert!(source.contains("#if !0\n\tif (debug) fprintf(stderr, \"running %s\\n\", \"/usr/local/bin/dcc\");"));
}

#[test]
fn test_archive_is_embedded() {
    let config = config(&["--valgrind", "prog.c"]);
    let toolchain = clang_14();
    let bytes = [1u8, 2, 3];
    let source = wrapper_source(&values(&config, &toolchain, Some(&bytes))).unwrap();
    assert!(source.contains("static unsigned char tar_data[] = {\n1,2,3,\n};"));
    assert!(source.contains("bufsize=3, mode='r|gz'"));
    assert!(source.contains("exec(open('watch_valgrind.py').read())"));
}

#[test]
fn test_valgrind_monitor_without_archive_reinvokes_driver() {
    let config = config(&["--valgrind", "--leak-check", "prog.c"]);
    let toolchain = clang_14();
    let values = values(&config, &toolchain, None);
    assert_eq!(
        values.value(TemplateField::MonitorValgrind),
        "/usr/local/bin/dcc --watch-stdin-for-valgrind-errors"
    );
    assert_eq!(values.value(TemplateField::LeakCheckYesNo), "yes");
    assert_eq!(values.value(TemplateField::SanitizerIsValgrind), "1");
    assert_eq!(values.value(TemplateField::SanitizerIsAddress), "0");
}

#[test]
fn test_main_symbol_follows_interception() {
    let toolchain = clang_14();

    let ifdef = config(&["--ifdef-main", "prog.c"]);
    let source = wrapper_source(&values(&ifdef, &toolchain, None)).unwrap();
    assert!(source.contains("int main(int argc, char *argv[], char *envp[]) {"));
    assert!(!source.contains("__wrap_main"));

    let wrap = config(&["--wrap-main", "prog.c"]);
    let source = wrapper_source(&values(&wrap, &toolchain, None)).unwrap();
    assert!(source.contains("int __wrap_main(int argc, char *argv[], char *envp[]) {"));

    let none = config(&["--no-wrap-main", "prog.c"]);
    let values = values(&none, &toolchain, None);
    assert_eq!(values.value(TemplateField::NoWrapMain), "1");
    assert_eq!(values.value(TemplateField::MainSymbol), "__wrap_main");
}

#[test]
fn test_strings_are_escaped() {
    let config = config(&["--suppressions=my \"supp\".txt", "prog.c"]);
    let toolchain = clang_14();
    let values = values(&config, &toolchain, None);
    assert_eq!(values.value(TemplateField::SuppressionsFile), r#"my \"supp\".txt"#);
}

#[test]
fn test_control_characters_are_escaped() {
    let config = config(&["--suppressions=a\nb\tc\x01d\x7f", "prog.c"]);
    let toolchain = clang_14();
    let values = values(&config, &toolchain, None);
    assert_eq!(values.value(TemplateField::SuppressionsFile), r"a\nb\tc\001d\177");
    assert_eq!(c_escape(r"C:\dcc"), r"C:\\dcc");
}

#[test]
fn test_unknown_placeholder_is_an_error() {
    let config = config(&["prog.c"]);
    let toolchain = clang_14();
    let err = render("__DCC_NOPE__", &values(&config, &toolchain, None)).unwrap_err();
    assert_eq!(err, TemplateError::UnknownPlaceholder("NOPE".to_string()));
}

#[test]
fn test_unused_field_is_an_error() {
    let config = config(&["prog.c"]);
    let toolchain = clang_14();
    let err = render("int x = __DCC_LEAK_CHECK_1_0__;", &values(&config, &toolchain, None)).unwrap_err();
    assert!(matches!(err, TemplateError::UnusedField(_)));
    assert_eq!(
        crate::error::DriverError::from(err).to_string(),
        "internal error: wrapper template never uses __DCC_PATH__"
    );
}

#[test]
fn test_self_path_rewrites_mount_points() {
    assert_eq!(self_path(&PathBuf::from("/tmp_amd/cage/export/cage/3/z1234/bin/dcc")), "/home/z1234/bin/dcc");
    assert_eq!(self_path(&PathBuf::from("/tmp_amd/adams/import/4/cs1511/bin/dcc")), "/home/cs1511/bin/dcc");
    assert_eq!(self_path(&PathBuf::from("/export/kamen/1/cs1521/bin/dcc")), "/home/cs1521/bin/dcc");
    assert_eq!(self_path(&PathBuf::from("/usr/local/bin/dcc")), "/usr/local/bin/dcc");
}
