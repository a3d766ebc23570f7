use assert_cmd::cargo; // Add methods on commands
use predicates::prelude::*; // Used for writing assertions
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

#[test]
fn convert_ihex_to_srec_stdin() -> STDRESULT {
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    let output = cmd.arg("convert")
        .arg("-i").arg("ihex")
        .arg("-o").arg("srec")
        .write_stdin(":0B0010006164647265737320676170A7\r\n:00000001FF\r\n")
        .assert()
        .success()
        .get_output().clone();
    let txt = String::from_utf8_lossy(&output.stdout);
    assert!(txt.starts_with("S0"));
    assert!(txt.contains("S10E00106164647265737320676170A3"));
    Ok(())
}

#[test]
fn convert_file_to_file() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let src = dir.path().join("img.hex");
    let dst = dir.path().join("img.txt");
    std::fs::write(&src,":0510000068656C6C6FD7\r\n:00000001FF\r\n")?;
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    cmd.arg("convert")
        .arg(src.to_str().unwrap())
        .arg("-o").arg("titxt")
        .arg("-d").arg(dst.to_str().unwrap())
        .assert()
        .success();
    assert_eq!(std::fs::read(&dst)?,b"@1000\n68 65 6C 6C 6F\nq\n".to_vec());
    Ok(())
}

#[test]
fn merge_titxt_files() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let a = dir.path().join("a.titxt");
    let b = dir.path().join("b.titxt");
    let out = dir.path().join("out.titxt");
    std::fs::write(&a,"@F000\nAA BB\nq\n")?;
    std::fs::write(&b,"@F002\nCC DD\nq\n")?;
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    cmd.arg("merge")
        .arg(a.to_str().unwrap())
        .arg(b.to_str().unwrap())
        .arg("-d").arg(out.to_str().unwrap())
        .assert()
        .success();
    assert_eq!(std::fs::read(&out)?,b"@F000\nAA BB CC DD\nq\n".to_vec());
    Ok(())
}

#[test]
fn fill_a_range() -> STDRESULT {
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    let output = cmd.arg("fill")
        .arg("-i").arg("ihex")
        .arg("-s").arg("0").arg("-e").arg("4")
        .arg("-v").arg("AB")
        .write_stdin(":00000001FF\r\n")
        .assert()
        .success()
        .get_output().clone();
    let txt = String::from_utf8_lossy(&output.stdout);
    assert!(txt.contains(":04000000ABABABAB50"));
    Ok(())
}

#[test]
fn crop_keeps_only_the_range() -> STDRESULT {
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    let output = cmd.arg("crop")
        .arg("-i").arg("ihex")
        .arg("-s").arg("0x1002").arg("-e").arg("0x1004")
        .write_stdin(":0510000068656C6C6FD7\r\n:00000001FF\r\n")
        .assert()
        .success()
        .get_output().clone();
    let txt = String::from_utf8_lossy(&output.stdout);
    assert!(txt.contains(":021002006C6C14"));
    assert!(!txt.contains("68656C6C6F"));
    Ok(())
}

#[test]
fn find_prints_the_address() -> STDRESULT {
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    cmd.arg("find")
        .arg("-i").arg("titxt")
        .arg("-v").arg("BB")
        .write_stdin("@F000\nAA BB\nq\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("0xf001"));
    Ok(())
}

#[test]
fn validate_passes_clean_file() -> STDRESULT {
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    cmd.arg("validate")
        .arg("-i").arg("srec")
        .write_stdin("S0030000FC\r\nS1080000010203040AE3\r\nS5030001FB\r\nS9030000FC\r\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("Passing"));
    Ok(())
}

#[test]
fn validate_reports_checksum_with_exit_code() -> STDRESULT {
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    cmd.arg("validate")
        .arg("-i").arg("ihex")
        .write_stdin(":0B0010006164647265737320676170A8\r\n:00000001FF\r\n")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("checksum"));
    Ok(())
}

#[test]
fn parse_error_exit_code() -> STDRESULT {
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    cmd.arg("convert")
        .arg("-i").arg("ihex")
        .arg("-o").arg("srec")
        .write_stdin("not a record file\n")
        .assert()
        .failure()
        .code(3);
    Ok(())
}

#[test]
fn missing_file_exit_code() -> STDRESULT {
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    cmd.arg("convert")
        .arg("no-such-file.hex")
        .arg("-o").arg("srec")
        .assert()
        .failure()
        .code(2);
    Ok(())
}

#[test]
fn xxd_style_display() -> STDRESULT {
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    cmd.arg("xxd")
        .arg("-i").arg("ihex")
        .write_stdin(":080000006162636465666768D4\r\n:00000001FF\r\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("6162 6364 6566 6768"))
        .stdout(predicate::str::contains("abcdefgh"));
    Ok(())
}

#[test]
fn hexdump_style_display() -> STDRESULT {
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    cmd.arg("hexdump")
        .arg("-i").arg("ihex")
        .write_stdin(":080000006162636465666768D4\r\n:00000001FF\r\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("61 62 63 64 65 66 67 68"))
        .stdout(predicate::str::contains("|abcdefgh|"));
    Ok(())
}

#[test]
fn shift_then_print() -> STDRESULT {
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    let output = cmd.arg("shift")
        .arg("-i").arg("titxt")
        .arg("-v").arg("0x10")
        .write_stdin("@F000\nAA BB\nq\n")
        .assert()
        .success()
        .get_output().clone();
    assert_eq!(String::from_utf8_lossy(&output.stdout),"@F010\nAA BB\nq\n");
    Ok(())
}

#[test]
fn split_writes_numbered_pieces() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let src = dir.path().join("img.titxt");
    let out = dir.path().join("piece.titxt");
    std::fs::write(&src,"@00F0\n01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F 10\n11 12\nq\n")?;
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    cmd.arg("split")
        .arg(src.to_str().unwrap())
        .arg("-v").arg("0x100")
        .arg("-d").arg(out.to_str().unwrap())
        .assert()
        .success()
        .stdout(predicate::str::contains("2 pieces"));
    assert_eq!(std::fs::read(dir.path().join("piece.0.titxt"))?,b"@00F0\n01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F 10\nq\n".to_vec());
    assert_eq!(std::fs::read(dir.path().join("piece.1.titxt"))?,b"@0100\n11 12\nq\n".to_vec());
    Ok(())
}

#[test]
fn unrecognized_extension_still_sniffs() -> STDRESULT {
    let dir = tempfile::tempdir()?;
    let src = dir.path().join("firmware");
    std::fs::write(&src,":0510000068656C6C6FD7\r\n:00000001FF\r\n")?;
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    let output = cmd.arg("convert")
        .arg(src.to_str().unwrap())
        .arg("-o").arg("titxt")
        .assert()
        .success()
        .get_output().clone();
    assert_eq!(String::from_utf8_lossy(&output.stdout),"@1000\n68 65 6C 6C 6F\nq\n");
    Ok(())
}

#[test]
fn invalid_format_name_is_usage_error() -> STDRESULT {
    let mut cmd = cargo::cargo_bin_cmd!("hexkit");
    cmd.arg("convert")
        .arg("-i").arg("pdf")
        .write_stdin(":00000001FF\r\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("pdf"));
    Ok(())
}
