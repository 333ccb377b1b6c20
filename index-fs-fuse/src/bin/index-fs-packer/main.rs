mod cli;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use index_fs::{BlockDevice, DiskInodeKind, IndexFileSystem, SECTOR_SIZE};
use index_fs_fuse::BlockFile;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    println!("source={:?}\nout={:?}", cli.source, cli.out);

    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&cli.out)?;
    fd.set_len(cli.sectors as u64 * SECTOR_SIZE as u64)?;

    let block_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd));
    let efs = IndexFileSystem::format(block_dev, cli.sectors).map_err(io::Error::other)?;

    for entry in fs::read_dir(&cli.source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let mut host_file = File::open(entry.path())?;
        let mut data: Vec<u8> = Vec::new();
        host_file.read_to_end(&mut data)?;

        let sector = efs
            .create_inode(0, DiskInodeKind::File)
            .map_err(io::Error::other)?;
        let inode = efs.open(sector).map_err(io::Error::other)?;
        let written = inode.write_at(0, &data);
        efs.close(inode);

        if written < data.len() {
            log::error!("{:?}: only {written} of {} bytes fit", entry.file_name(), data.len());
            return Err(io::Error::other("image is full"));
        }
        println!("{:?} -> inode {sector}, {written} bytes", entry.file_name());
    }

    println!("{} sectors free", efs.free_map().free_count());
    Ok(())
}
