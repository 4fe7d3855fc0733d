use dsync::{sync_local, Request, SyncError, TransferOptions};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn request(src: &Path, dst: &Path, block_size: usize) -> Request {
    Request::local(src, dst).with_block_size(block_size)
}

#[tokio::test]
async fn test_empty_destination_copies_everything() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let src = temp.path().join("src");
    let dst = temp.path().join("dst");
    fs::create_dir(&src)?;
    fs::write(src.join("a"), vec![b'a'; 10])?;
    fs::write(src.join("b"), vec![b'b'; 20])?;

    let stats = sync_local(request(&src, &dst, 10), &TransferOptions::default()).await?;

    assert_eq!(stats.bytes_sent, 30);
    assert_eq!(stats.bytes_same, 0);
    assert_eq!(stats.files, 2);
    assert_eq!(stats.directories, 1);
    assert_eq!(fs::read(dst.join("a"))?, vec![b'a'; 10]);
    assert_eq!(fs::read(dst.join("b"))?, vec![b'b'; 20]);
    Ok(())
}

#[tokio::test]
async fn test_prefix_destination_sends_only_tail() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let src = temp.path().join("src");
    let dst = temp.path().join("dst");
    fs::create_dir(&src)?;
    fs::create_dir(&dst)?;
    fs::write(src.join("a"), vec![b'a'; 20])?;
    fs::write(dst.join("a"), vec![b'a'; 10])?;

    let stats = sync_local(request(&src, &dst, 10), &TransferOptions::default()).await?;

    assert_eq!(stats.bytes_sent, 10);
    assert_eq!(stats.bytes_same, 10);
    assert_eq!(fs::read(dst.join("a"))?, vec![b'a'; 20]);
    Ok(())
}

#[tokio::test]
async fn test_second_run_copies_nothing() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let src = temp.path().join("src");
    let dst = temp.path().join("dst");
    fs::create_dir_all(src.join("nested/deeper"))?;
    fs::write(src.join("top.txt"), "top level file")?;
    fs::write(src.join("nested/deeper/data.bin"), vec![7u8; 5000])?;

    let opts = TransferOptions::default();
    let first = sync_local(request(&src, &dst, 64), &opts).await?;
    assert_eq!(first.bytes_sent, 5014);

    let second = sync_local(request(&src, &dst, 64), &opts).await?;
    assert_eq!(second.bytes_sent, 0);
    assert_eq!(second.bytes_same, 5014);
    assert_eq!(second.directories, 3);
    Ok(())
}

#[tokio::test]
async fn test_block_larger_than_file() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let src = temp.path().join("src");
    let dst = temp.path().join("dst");
    fs::create_dir(&src)?;
    fs::create_dir(&dst)?;
    fs::write(src.join("small"), "0123456789")?;
    fs::write(dst.join("small"), "0123456789")?;

    let stats = sync_local(request(&src, &dst, 1 << 20), &TransferOptions::default()).await?;

    assert_eq!(stats.bytes_sent, 0);
    assert_eq!(stats.bytes_same, 10);
    Ok(())
}

#[tokio::test]
async fn test_shorter_source_truncates_destination() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let src = temp.path().join("src");
    let dst = temp.path().join("dst");
    fs::create_dir(&src)?;
    fs::create_dir(&dst)?;
    fs::write(src.join("f"), "short")?;
    fs::write(dst.join("f"), "a much longer destination file")?;

    sync_local(request(&src, &dst, 4), &TransferOptions::default()).await?;

    assert_eq!(fs::read_to_string(dst.join("f"))?, "short");
    Ok(())
}

#[tokio::test]
async fn test_changed_middle_block() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let src = temp.path().join("src");
    let dst = temp.path().join("dst");
    fs::create_dir(&src)?;
    fs::create_dir(&dst)?;
    fs::write(src.join("f"), "aaaaBBBBcccc")?;
    fs::write(dst.join("f"), "aaaaXXXXcccc")?;

    let stats = sync_local(request(&src, &dst, 4), &TransferOptions::default()).await?;

    assert_eq!(stats.bytes_sent, 4);
    assert_eq!(stats.bytes_same, 8);
    assert_eq!(fs::read_to_string(dst.join("f"))?, "aaaaBBBBcccc");
    Ok(())
}

#[tokio::test]
async fn test_mtime_preserved() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let src = temp.path().join("src");
    let dst = temp.path().join("dst");
    fs::create_dir(&src)?;
    fs::write(src.join("f"), "content")?;
    let mtime = filetime::FileTime::from_unix_time(1_500_000_000, 0);
    filetime::set_file_mtime(src.join("f"), mtime)?;

    sync_local(request(&src, &dst, 16), &TransferOptions::default()).await?;

    let copied = filetime::FileTime::from_last_modification_time(&fs::metadata(dst.join("f"))?);
    assert_eq!(copied, mtime);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinks_recreated() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let src = temp.path().join("src");
    let dst = temp.path().join("dst");
    fs::create_dir(&src)?;
    fs::write(src.join("target.txt"), "linked")?;
    std::os::unix::fs::symlink("target.txt", src.join("link"))?;

    let stats = sync_local(request(&src, &dst, 16), &TransferOptions::default()).await?;

    assert_eq!(stats.symlinks, 1);
    assert_eq!(fs::read_link(dst.join("link"))?, Path::new("target.txt"));
    assert_eq!(fs::read_to_string(dst.join("link"))?, "linked");
    Ok(())
}

#[tokio::test]
async fn test_zero_block_size_rejected() {
    let temp = TempDir::new().unwrap();
    let result = sync_local(
        request(temp.path(), &temp.path().join("dst"), 0),
        &TransferOptions::default(),
    )
    .await;

    assert!(matches!(result, Err(SyncError::InvalidRequest(_))));
    assert!(!temp.path().join("dst").exists());
}

#[tokio::test]
async fn test_missing_source_fails() {
    let temp = TempDir::new().unwrap();
    let result = sync_local(
        request(&temp.path().join("missing"), &temp.path().join("dst"), 16),
        &TransferOptions::default(),
    )
    .await;

    assert!(result.is_err());
}
