use super::*;
use tempfile::TempDir;

fn write_app(dir: &Path, file: &str, header: &str) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, format!("{}print('ok')\n", header)).unwrap();
    path
}

fn sample_apps(dir: &Path) -> Vec<AppDescriptor> {
    write_app(
        dir,
        "weather.app",
        "# Name: Weather\n# Description: Fetch the forecast\n# Category: Internet\n",
    );
    write_app(
        dir,
        "backup.app",
        "# Name: Backup\n# Description: Copy documents to the NAS\n# Category: System\n",
    );
    write_app(dir, "zzz.app", "");
    list_apps(dir)
}

#[test]
fn test_list_apps_sorted_by_name() {
    let tmp = TempDir::new().unwrap();
    let apps = sample_apps(tmp.path());
    let names: Vec<&str> = apps.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Backup", "Weather", "zzz"]);
}

#[test]
fn test_list_apps_ignores_other_files() {
    let tmp = TempDir::new().unwrap();
    write_app(tmp.path(), "real.app", "");
    fs::write(tmp.path().join("notes.txt"), "# Name: Nope\n").unwrap();
    fs::create_dir(tmp.path().join("folder.app")).unwrap();

    let apps = list_apps(tmp.path());
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].name, "real");
}

#[test]
fn test_list_apps_missing_dir_is_empty() {
    let tmp = TempDir::new().unwrap();
    assert!(list_apps(&tmp.path().join("absent")).is_empty());
}

#[test]
fn test_list_apps_rescans_each_call() {
    let tmp = TempDir::new().unwrap();
    assert!(list_apps(tmp.path()).is_empty());
    write_app(tmp.path(), "late.app", "");
    assert_eq!(list_apps(tmp.path()).len(), 1);
}

#[test]
fn test_filter_matches_name_description_category() {
    let tmp = TempDir::new().unwrap();
    let apps = sample_apps(tmp.path());

    let by_name = filter_apps(&apps, "weath");
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].name, "Weather");

    let by_description = filter_apps(&apps, "NAS");
    assert_eq!(by_description[0].name, "Backup");

    let by_category = filter_apps(&apps, "utility");
    assert_eq!(by_category.len(), 1);
    assert_eq!(by_category[0].name, "zzz");
}

#[test]
fn test_filter_empty_term_keeps_all() {
    let tmp = TempDir::new().unwrap();
    let apps = sample_apps(tmp.path());
    assert_eq!(filter_apps(&apps, "  ").len(), apps.len());
    assert!(filter_apps(&apps, "no-such-thing").is_empty());
}

#[test]
fn test_find_app_by_name_or_stem() {
    let tmp = TempDir::new().unwrap();
    let apps = sample_apps(tmp.path());
    assert_eq!(find_app(&apps, "weather").unwrap().name, "Weather");
    assert_eq!(find_app(&apps, "BACKUP").unwrap().name, "Backup");
    assert!(find_app(&apps, "missing").is_none());
}

#[test]
fn test_install_app_copies_into_apps_dir() {
    let src_dir = TempDir::new().unwrap();
    let home = TempDir::new().unwrap();
    let source = write_app(src_dir.path(), "clock.app", "# Name: Clock\n");
    let apps_dir = home.path().join("apps");

    let dest = install_app(&source, &apps_dir).unwrap();
    assert_eq!(dest, apps_dir.join("clock.app"));
    assert!(source.exists());

    let apps = list_apps(&apps_dir);
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].name, "Clock");
}

#[test]
fn test_install_app_rejects_missing_and_wrong_extension() {
    let tmp = TempDir::new().unwrap();
    let apps_dir = tmp.path().join("apps");

    let missing = install_app(&tmp.path().join("ghost.app"), &apps_dir);
    assert!(matches!(missing, Err(LauncherError::Storage { .. })));

    let txt = tmp.path().join("readme.txt");
    fs::write(&txt, "hi").unwrap();
    let wrong = install_app(&txt, &apps_dir);
    assert!(matches!(wrong, Err(LauncherError::Storage { .. })));
    assert!(!apps_dir.join("readme.txt").exists());
}
