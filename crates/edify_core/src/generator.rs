use crate::error::{EdifyError, Result};
use crate::fstab::{Fstab, PartitionType};
use crate::script::Script;
use crate::setup::{octal_mode, SetupStep};
use crate::wrap::word_wrap;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Mount parameters used when the device has no fstab.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LegacyMount {
    pub fs_type: String,
    pub partition_type: String,
    pub partition_path: String,
}

impl Default for LegacyMount {
    fn default() -> Self {
        Self {
            fs_type: "yaffs2".to_string(),
            partition_type: "MTD".to_string(),
            partition_path: String::new(),
        }
    }
}

impl LegacyMount {
    fn path_for(&self, mount_point: &str) -> String {
        format!("{}{}", self.partition_path, mount_point.trim_start_matches('/'))
    }
}

/// Emits edify commands into a [`Script`].
///
/// Device-specific behaviour is configuration: the extra setup steps are
/// appended after every device assertion.
#[derive(Debug, Clone, Default)]
pub struct EdifyGenerator {
    fstab: Option<Fstab>,
    legacy: LegacyMount,
    extra_setup: Vec<SetupStep>,
}

impl EdifyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fstab(mut self, fstab: Fstab) -> Self {
        self.fstab = if fstab.is_empty() { None } else { Some(fstab) };
        self
    }

    pub fn with_legacy_mount(mut self, legacy: LegacyMount) -> Self {
        self.legacy = legacy;
        self
    }

    pub fn with_extra_setup(mut self, steps: Vec<SetupStep>) -> Self {
        self.extra_setup = steps;
        self
    }

    pub fn fstab(&self) -> Option<&Fstab> {
        self.fstab.as_ref()
    }

    pub fn extra_setup(&self) -> &[SetupStep] {
        &self.extra_setup
    }

    pub fn assert_device(&self, script: &mut Script, device: &str) {
        debug!(device, extra_steps = self.extra_setup.len(), "asserting device");
        let cmd = format!(
            "assert(getprop(\"ro.product.device\") == \"{0}\" ||\0\
             getprop(\"ro.build.product\") == \"{0}\");",
            device
        );
        script.push(word_wrap(&cmd));
        for step in &self.extra_setup {
            script.push(step.render());
        }
    }

    pub fn assert_some_fingerprint(&self, script: &mut Script, fingerprints: &[impl AsRef<str>]) -> Result<()> {
        if fingerprints.is_empty() {
            return Err(EdifyError::EmptyArgument("assert_some_fingerprint"));
        }
        let checks: Vec<String> = fingerprints
            .iter()
            .map(|fp| {
                format!(
                    "file_getprop(\"/system/build.prop\", \"ro.build.fingerprint\") == \"{}\"",
                    fp.as_ref()
                )
            })
            .collect();
        script.push(word_wrap(&format!("assert({});", checks.join(" ||\0"))));
        Ok(())
    }

    pub fn assert_older_build(&self, script: &mut Script, timestamp: u64) {
        script.push(format!(
            "assert(!less_than_int({}, getprop(\"ro.build.date.utc\")));",
            timestamp
        ));
    }

    pub fn assert_some_bootloader(&self, script: &mut Script, bootloaders: &[impl AsRef<str>]) -> Result<()> {
        if bootloaders.is_empty() {
            return Err(EdifyError::EmptyArgument("assert_some_bootloader"));
        }
        let checks: Vec<String> = bootloaders
            .iter()
            .map(|b| format!("getprop(\"ro.bootloader\") == \"{}\"", b.as_ref()))
            .collect();
        script.push(word_wrap(&format!("assert({});", checks.join(" ||\0"))));
        Ok(())
    }

    /// Runs backuptool with `command` (`backup` or `restore`).
    pub fn run_backup(&self, script: &mut Script, command: &str) {
        debug!(command, "backuptool");
        script.push("package_extract_file(\"system/bin/backuptool.sh\", \"/tmp/backuptool.sh\");");
        script.push(
            "package_extract_file(\"system/bin/backuptool.functions\", \"/tmp/backuptool.functions\");",
        );
        script.push("set_perm(0, 0, 0777, \"/tmp/backuptool.sh\");");
        script.push("set_perm(0, 0, 0644, \"/tmp/backuptool.functions\");");
        script.push(format!("run_program(\"/tmp/backuptool.sh\", \"{}\");", command));
        if command == "restore" {
            script.push("delete(\"/system/bin/backuptool.sh\");");
            script.push("delete(\"/system/bin/backuptool.functions\");");
        }
    }

    pub fn show_progress(&self, script: &mut Script, fraction: f64, duration: f64) {
        script.push(format!("show_progress({:.6}, {});", fraction, duration as i64));
    }

    pub fn set_progress(&self, script: &mut Script, fraction: f64) {
        script.push(format!("set_progress({:.6});", fraction));
    }

    pub fn patch_check(&self, script: &mut Script, filename: &str, sha1s: &[impl AsRef<str>]) {
        let sums: String = sha1s.iter().map(|s| format!(", \"{}\"", s.as_ref())).collect();
        script.push(format!("assert(apply_patch_check(\"{}\"{}));", filename, sums));
    }

    pub fn cache_free_space_check(&self, script: &mut Script, amount: u64) {
        script.push(format!("assert(apply_patch_space({}));", amount));
    }

    pub fn mount(&self, script: &mut Script, mount_point: &str) -> Result<()> {
        let cmd = match &self.fstab {
            Some(fstab) => {
                let p = fstab.get(mount_point)?;
                format!(
                    "mount(\"{}\", \"{}\", \"{}\", \"{}\");",
                    p.fs_type,
                    p.partition_type()?,
                    p.device,
                    p.mount_point
                )
            }
            None => format!(
                "mount(\"{}\", \"{}\", \"{}\", \"{}\");",
                self.legacy.fs_type,
                self.legacy.partition_type,
                self.legacy.path_for(mount_point),
                mount_point
            ),
        };
        script.push(cmd);
        script.record_mount(mount_point);
        Ok(())
    }

    pub fn unpack_package_dir(&self, script: &mut Script, src: &str, dst: &str) {
        script.push(format!("package_extract_dir(\"{}\", \"{}\");", src, dst));
    }

    pub fn comment(&self, script: &mut Script, comment: &str) {
        for line in comment.split('\n') {
            script.push(format!("# {}", line));
        }
    }

    pub fn print(&self, script: &mut Script, message: &str) {
        script.push(format!("ui_print(\"{}\");", message));
    }

    pub fn format_partition(&self, script: &mut Script, mount_point: &str) -> Result<()> {
        let cmd = match &self.fstab {
            Some(fstab) => {
                let p = fstab.get(mount_point)?;
                format!(
                    "format(\"{}\", \"{}\", \"{}\", \"{}\");",
                    p.fs_type,
                    p.partition_type()?,
                    p.device,
                    p.length
                )
            }
            None => format!(
                "format(\"{}\", \"{}\");",
                self.legacy.partition_type,
                self.legacy.path_for(mount_point)
            ),
        };
        script.push(cmd);
        Ok(())
    }

    pub fn delete_files(&self, script: &mut Script, files: &[impl AsRef<str>]) {
        if files.is_empty() {
            return;
        }
        let quoted: Vec<String> = files.iter().map(|f| format!("\"{}\"", f.as_ref())).collect();
        script.push(word_wrap(&format!("delete({});", quoted.join(",\0"))));
    }

    pub fn rename_file(&self, script: &mut Script, src: &str, dst: &str) {
        script.push(format!("rename(\"{}\", \"{}\");", src, dst));
    }

    /// `patches` pairs a source sha1 with the patch file inside the package.
    pub fn apply_patch(
        &self,
        script: &mut Script,
        src_file: &str,
        tgt_file: &str,
        tgt_size: u64,
        tgt_sha1: &str,
        patches: &[(&str, &str)],
    ) -> Result<()> {
        if patches.is_empty() {
            return Err(EdifyError::EmptyArgument("apply_patch"));
        }
        let mut cmd = format!(
            "apply_patch(\"{}\",\0\"{}\",\0{},\0{}",
            src_file, tgt_file, tgt_sha1, tgt_size
        );
        for (sha1, patch) in patches {
            cmd.push_str(&format!(",\0{}, package_extract_file(\"{}\")", sha1, patch));
        }
        cmd.push_str(");");
        script.push(word_wrap(&cmd));
        Ok(())
    }

    pub fn write_firmware_image(&self, script: &mut Script, kind: &str, file: &str) {
        script.push(format!("write_firmware_image(\"PACKAGE:{}\", \"{}\");", file, kind));
    }

    pub fn write_raw_image(&self, script: &mut Script, mount_point: &str, file: &str) -> Result<()> {
        let cmd = match &self.fstab {
            Some(fstab) => {
                let p = fstab.get(mount_point)?;
                match p.partition_type()? {
                    PartitionType::Mtd => format!(
                        "write_raw_image(package_extract_file(\"{}\"), \"{}\");",
                        file, p.device
                    ),
                    PartitionType::Emmc => {
                        format!("package_extract_file(\"{}\", \"{}\");", file, p.device)
                    }
                    PartitionType::Bml => format!(
                        "assert(package_extract_file(\"{file}\", \"/tmp/{dev}.img\"),\n       \
                         write_raw_image(\"/tmp/{dev}.img\", \"{dev}\"),\n       \
                         delete(\"/tmp/{dev}.img\"));",
                        file = file,
                        dev = p.device
                    ),
                }
            }
            None => format!(
                "write_raw_image(package_extract_file(\"{}\"), \"{}\");",
                file,
                self.legacy.path_for(mount_point)
            ),
        };
        script.push(cmd);
        Ok(())
    }

    pub fn set_permissions(&self, script: &mut Script, path: &str, uid: u32, gid: u32, mode: u32) {
        script.push(format!(
            "set_perm({}, {}, {}, \"{}\");",
            uid,
            gid,
            octal_mode(mode),
            path
        ));
    }

    pub fn set_permissions_recursive(
        &self,
        script: &mut Script,
        path: &str,
        uid: u32,
        gid: u32,
        dir_mode: u32,
        file_mode: u32,
    ) {
        script.push(format!(
            "set_perm_recursive({}, {}, {}, {}, \"{}\");",
            uid,
            gid,
            octal_mode(dir_mode),
            octal_mode(file_mode),
            path
        ));
    }

    /// `links` holds `(target, link)` pairs; one `symlink` call per target.
    pub fn make_symlinks(&self, script: &mut Script, links: &[(&str, &str)]) {
        let mut by_target: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (target, link) in links {
            by_target.entry(*target).or_default().push(*link);
        }
        for (target, mut names) in by_target {
            names.sort_unstable();
            let quoted: Vec<String> = names.iter().map(|n| format!("\"{}\"", n)).collect();
            script.push(word_wrap(&format!(
                "symlink(\"{}\", {});",
                target,
                quoted.join(",\0")
            )));
        }
    }

    pub fn append_extra(&self, script: &mut Script, extra: &str) {
        script.push(extra);
    }

    pub fn unmount_all(&self, script: &mut Script) {
        for mount_point in script.take_mounts() {
            script.push(format!("unmount(\"{}\");", mount_point));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fstab::FstabEntry;

    const DEVICE_ASSERT: &str = "assert(getprop(\"ro.product.device\") == \"galaxys\" ||\n       \
                                 getprop(\"ro.build.product\") == \"galaxys\");";

    fn bml_generator() -> EdifyGenerator {
        EdifyGenerator::new().with_extra_setup(SetupStep::samsung_bml())
    }

    fn fstab_generator() -> EdifyGenerator {
        let entry = |mp: &str, fs: &str, dev: &str| FstabEntry {
            mount_point: mp.to_string(),
            fs_type: fs.to_string(),
            device: dev.to_string(),
            device2: None,
            length: 0,
        };
        let fstab: Fstab = vec![
            entry("/system", "ext4", "/dev/block/mmcblk0p9"),
            entry("/cache", "yaffs2", "cache"),
            entry("/boot", "bml", "/dev/block/bml7"),
            entry("/recovery", "emmc", "/dev/block/mmcblk0p6"),
            entry("/misc", "mtd", "misc"),
        ]
        .into_iter()
        .collect();
        EdifyGenerator::new().with_fstab(fstab)
    }

    #[test]
    fn test_assert_device_base() {
        let mut script = Script::new();
        EdifyGenerator::new().assert_device(&mut script, "galaxys");
        assert_eq!(script.entries(), &[DEVICE_ASSERT.to_string()]);
    }

    #[test]
    fn test_assert_device_appends_bml_setup() {
        let mut script = Script::new();
        bml_generator().assert_device(&mut script, "galaxys");

        let entries = script.entries();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0], DEVICE_ASSERT);
        assert_eq!(
            entries[1],
            "package_extract_file(\"mke2fs\", \"/tmp/mke2fs\");\nset_perm(0, 0, 0777, \"/tmp/mke2fs\");"
        );
        assert_eq!(
            entries[2],
            "package_extract_file(\"busybox\", \"/tmp/busybox\");\nset_perm(0, 0, 0777, \"/tmp/busybox\");"
        );
        assert_eq!(
            entries[3],
            "package_extract_file(\"bmlunlock\", \"/tmp/bmlunlock\");\nset_perm(0, 0, 0777, \"/tmp/bmlunlock\");"
        );
        assert_eq!(entries[4], "package_extract_file(\"boot.img\", \"/tmp/boot.img\");");
    }

    #[test]
    fn test_setup_block_independent_of_device() {
        let generator = bml_generator();
        let mut a = Script::new();
        let mut b = Script::new();
        generator.assert_device(&mut a, "captivatemtd");
        generator.assert_device(&mut b, "a \"weird\" id with spaces");
        assert_ne!(a.entries()[0], b.entries()[0]);
        assert_eq!(a.entries()[1..], b.entries()[1..]);
    }

    #[test]
    fn test_assert_device_twice_repeats_block() {
        let generator = bml_generator();
        let mut script = Script::new();
        generator.assert_device(&mut script, "galaxys");
        generator.assert_device(&mut script, "galaxys");
        assert_eq!(script.len(), 10);
        assert_eq!(script.entries()[..5], script.entries()[5..]);
    }

    #[test]
    fn test_run_backup_is_unaffected_by_setup() {
        let mut plain = Script::new();
        let mut extended = Script::new();
        EdifyGenerator::new().run_backup(&mut plain, "backup");
        bml_generator().run_backup(&mut extended, "backup");
        assert_eq!(plain, extended);
        assert_eq!(plain.len(), 5);
        assert_eq!(plain.entries()[4], "run_program(\"/tmp/backuptool.sh\", \"backup\");");
    }

    #[test]
    fn test_run_backup_restore_cleans_up() {
        let mut script = Script::new();
        EdifyGenerator::new().run_backup(&mut script, "restore");
        assert_eq!(script.len(), 7);
        assert_eq!(script.entries()[6], "delete(\"/system/bin/backuptool.functions\");");
    }

    #[test]
    fn test_fingerprint_and_bootloader() {
        let generator = EdifyGenerator::new();
        let mut script = Script::new();
        generator
            .assert_some_fingerprint(&mut script, &["samsung/GT-I9000/GT-I9000:2.3.3/GINGERBREAD/XXJVK:user/release-keys"])
            .unwrap();
        generator.assert_some_bootloader(&mut script, &["I9000XXJVK", "I9000XXJVQ"]).unwrap();
        assert_eq!(
            script.entries()[0],
            "assert(file_getprop(\"/system/build.prop\", \"ro.build.fingerprint\") == \
             \"samsung/GT-I9000/GT-I9000:2.3.3/GINGERBREAD/XXJVK:user/release-keys\");"
        );
        assert_eq!(
            script.entries()[1],
            "assert(getprop(\"ro.bootloader\") == \"I9000XXJVK\" ||\n       \
             getprop(\"ro.bootloader\") == \"I9000XXJVQ\");"
        );

        let none: &[&str] = &[];
        assert!(matches!(
            generator.assert_some_fingerprint(&mut script, none),
            Err(EdifyError::EmptyArgument(_))
        ));
        assert_eq!(script.len(), 2);
    }

    #[test]
    fn test_progress_and_checks() {
        let generator = EdifyGenerator::new();
        let mut script = Script::new();
        generator.show_progress(&mut script, 0.5, 10.9);
        generator.set_progress(&mut script, 1.0);
        generator.assert_older_build(&mut script, 1300000000);
        generator.patch_check(&mut script, "/system/app/Phone.apk", &["abc", "def"]);
        generator.cache_free_space_check(&mut script, 4096);
        assert_eq!(
            script.entries(),
            &[
                "show_progress(0.500000, 10);".to_string(),
                "set_progress(1.000000);".to_string(),
                "assert(!less_than_int(1300000000, getprop(\"ro.build.date.utc\")));".to_string(),
                "assert(apply_patch_check(\"/system/app/Phone.apk\", \"abc\", \"def\"));".to_string(),
                "assert(apply_patch_space(4096));".to_string(),
            ]
        );
    }

    #[test]
    fn test_mount_with_fstab_and_unmount_all() {
        let generator = fstab_generator();
        let mut script = Script::new();
        generator.mount(&mut script, "/system").unwrap();
        generator.mount(&mut script, "/cache").unwrap();
        generator.unmount_all(&mut script);
        generator.unmount_all(&mut script);
        assert_eq!(
            script.entries(),
            &[
                "mount(\"ext4\", \"EMMC\", \"/dev/block/mmcblk0p9\", \"/system\");".to_string(),
                "mount(\"yaffs2\", \"MTD\", \"cache\", \"/cache\");".to_string(),
                "unmount(\"/cache\");".to_string(),
                "unmount(\"/system\");".to_string(),
            ]
        );
    }

    #[test]
    fn test_mount_unknown_mount_point() {
        let mut script = Script::new();
        let result = fstab_generator().mount(&mut script, "/data");
        assert!(matches!(result, Err(EdifyError::UnknownMountPoint(_))));
        assert!(script.is_empty());
        assert_eq!(script.mounts().count(), 0);
    }

    #[test]
    fn test_legacy_mount_and_format() {
        let generator = EdifyGenerator::new().with_legacy_mount(LegacyMount {
            fs_type: "ext4".into(),
            partition_type: "EMMC".into(),
            partition_path: "/dev/block/platform/sdhci.0/by-name/".into(),
        });
        let mut script = Script::new();
        generator.mount(&mut script, "/system").unwrap();
        generator.format_partition(&mut script, "/system").unwrap();
        generator.write_raw_image(&mut script, "/boot", "boot.img").unwrap();
        assert_eq!(
            script.entries(),
            &[
                "mount(\"ext4\", \"EMMC\", \"/dev/block/platform/sdhci.0/by-name/system\", \"/system\");".to_string(),
                "format(\"EMMC\", \"/dev/block/platform/sdhci.0/by-name/system\");".to_string(),
                "write_raw_image(package_extract_file(\"boot.img\"), \"/dev/block/platform/sdhci.0/by-name/boot\");".to_string(),
            ]
        );
    }

    #[test]
    fn test_write_raw_image_by_partition_type() {
        let generator = fstab_generator();
        let mut script = Script::new();
        generator.write_raw_image(&mut script, "/misc", "misc.img").unwrap();
        generator.write_raw_image(&mut script, "/recovery", "recovery.img").unwrap();
        assert_eq!(
            script.entries(),
            &[
                "write_raw_image(package_extract_file(\"misc.img\"), \"misc\");".to_string(),
                "package_extract_file(\"recovery.img\", \"/dev/block/mmcblk0p6\");".to_string(),
            ]
        );
    }

    #[test]
    fn test_write_raw_image_bml_stages_in_tmp() {
        let fstab = Fstab::parse(include_str!("../../../profiles/galaxys.recovery.fstab")).unwrap();
        let generator = EdifyGenerator::new().with_fstab(fstab);
        let mut script = Script::new();
        generator.write_raw_image(&mut script, "/boot", "boot.img").unwrap();
        assert_eq!(
            script.entries()[0],
            "assert(package_extract_file(\"boot.img\", \"/tmp/boot.img\"),\n       \
             write_raw_image(\"/tmp/boot.img\", \"boot\"),\n       \
             delete(\"/tmp/boot.img\"));"
        );
    }

    #[test]
    fn test_format_with_fstab() {
        let mut script = Script::new();
        fstab_generator().format_partition(&mut script, "/cache").unwrap();
        assert_eq!(script.entries()[0], "format(\"yaffs2\", \"MTD\", \"cache\", \"0\");");

        let fstab = Fstab::parse("/data ext4 /dev/block/mmcblk0p2 length=-16384\n").unwrap();
        let mut script = Script::new();
        EdifyGenerator::new().with_fstab(fstab).format_partition(&mut script, "/data").unwrap();
        assert_eq!(
            script.entries()[0],
            "format(\"ext4\", \"EMMC\", \"/dev/block/mmcblk0p2\", \"-16384\");"
        );
    }

    #[test]
    fn test_delete_rename_and_dirs() {
        let generator = EdifyGenerator::new();
        let mut script = Script::new();
        let none: &[&str] = &[];
        generator.delete_files(&mut script, none);
        generator.delete_files(&mut script, &["/system/a", "/system/b"]);
        generator.rename_file(&mut script, "/system/a", "/system/c");
        generator.unpack_package_dir(&mut script, "system", "/system");
        assert_eq!(
            script.entries(),
            &[
                "delete(\"/system/a\",\n       \"/system/b\");".to_string(),
                "rename(\"/system/a\", \"/system/c\");".to_string(),
                "package_extract_dir(\"system\", \"/system\");".to_string(),
            ]
        );
    }

    #[test]
    fn test_apply_patch() {
        let generator = EdifyGenerator::new();
        let mut script = Script::new();
        generator
            .apply_patch(&mut script, "/system/a", "-", 12, "t1", &[("s1", "patch/system/a.p")])
            .unwrap();
        assert_eq!(
            script.entries()[0],
            "apply_patch(\"/system/a\", \"-\", t1, 12,\n            s1, package_extract_file(\"patch/system/a.p\"));"
        );
        assert!(matches!(
            generator.apply_patch(&mut script, "/system/a", "-", 12, "t1", &[]),
            Err(EdifyError::EmptyArgument(_))
        ));
    }

    #[test]
    fn test_permissions_and_symlinks() {
        let generator = EdifyGenerator::new();
        let mut script = Script::new();
        generator.set_permissions(&mut script, "/system/xbin/su", 0, 0, 0o6755);
        generator.set_permissions_recursive(&mut script, "/system", 0, 0, 0o755, 0o644);
        generator.make_symlinks(
            &mut script,
            &[
                ("toolbox", "/system/bin/ps"),
                ("busybox", "/system/xbin/vi"),
                ("toolbox", "/system/bin/ls"),
            ],
        );
        assert_eq!(
            script.entries(),
            &[
                "set_perm(0, 0, 06755, \"/system/xbin/su\");".to_string(),
                "set_perm_recursive(0, 0, 0755, 0644, \"/system\");".to_string(),
                "symlink(\"busybox\", \"/system/xbin/vi\");".to_string(),
                "symlink(\"toolbox\", \"/system/bin/ls\",\n        \"/system/bin/ps\");".to_string(),
            ]
        );
    }

    #[test]
    fn test_comment_print_and_extra() {
        let generator = EdifyGenerator::new();
        let mut script = Script::new();
        generator.comment(&mut script, "first\nsecond");
        generator.print(&mut script, "Installing");
        generator.write_firmware_image(&mut script, "radio", "radio.img");
        generator.append_extra(&mut script, "run_program(\"/tmp/bmlunlock\");");
        assert_eq!(
            script.render(),
            "# first\n# second\nui_print(\"Installing\");\n\
             write_firmware_image(\"PACKAGE:radio.img\", \"radio\");\n\
             run_program(\"/tmp/bmlunlock\");\n"
        );
    }
}
