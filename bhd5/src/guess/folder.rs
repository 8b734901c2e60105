//! Folder guesser.
//!
//! Maps a guessed extension (possibly `<ext>.dcx`) to a canonical output
//! subdirectory, peeking archive contents for `.bnd`/`.bhd` to bucket by
//! their most frequent inner extension.

use std::io::{Read, Seek};

use crate::bnd::BndArchive;
use crate::Result;

/// Guess the destination folder for `extension` (e.g. `.msb`, `.bnd.dcx`).
/// `peek` is consulted only for `.bnd`/`.bhd`-rooted extensions, to look
/// inside the archive and bucket by its most common inner extension.
pub fn guess_folder<R: Read + Seek>(extension: &str, peek: Option<&mut R>) -> Result<String> {
    if let Some(inner) = extension.strip_suffix(".dcx") {
        let nested = guess_folder::<R>(inner, None)?;
        return Ok(format!("{nested}/dcx"));
    }

    if (extension == ".bnd" || extension == ".bhd") && peek.is_some() {
        let stream = peek.unwrap();
        if let Some(inner_folder) = peek_most_frequent_folder(stream)? {
            return Ok(format!("bind/{inner_folder}"));
        }
        return Ok("bind".to_string());
    }

    Ok(table_lookup(extension))
}

fn peek_most_frequent_folder<R: Read + Seek>(stream: &mut R) -> Result<Option<String>> {
    let start = stream.stream_position()?;
    let names = match BndArchive::peek_entry_names(stream) {
        Ok(names) => names,
        Err(_) => {
            stream.seek(std::io::SeekFrom::Start(start))?;
            return Ok(None);
        }
    };
    stream.seek(std::io::SeekFrom::Start(start))?;

    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for name in &names {
        if let Some(dot) = name.rfind('.') {
            let ext = format!(".{}", &name[dot + 1..].to_lowercase());
            *counts.entry(ext).or_insert(0) += 1;
        }
    }
    let most_frequent = counts.into_iter().max_by_key(|(_, count)| *count).map(|(ext, _)| ext);
    match most_frequent {
        Some(ext) => Ok(Some(table_lookup(&ext))),
        None => Ok(None),
    }
}

fn table_lookup(extension: &str) -> String {
    const TABLE: &[(&str, &str)] = &[
        (".flv", "model"),
        (".flver", "model"),
        (".smd", "model"),
        (".mdl", "model"),
        (".msb", "model/map"),
        (".nva", "model/map/ch_nav"),
        (".hnav", "model/map/ch_nav"),
        (".htr", "model/map/ch_nav"),
        (".drb", "lang/menu"),
        (".fmg", "lang/text"),
        (".tpf", "image"),
        (".dds", "image"),
        (".png", "image"),
        (".fsb", "sound"),
        (".fev", "sound"),
        (".lua", "script"),
        (".lc", "script"),
        (".evd", "script"),
        (".emevd", "script"),
        (".eld", "script"),
        (".luainfo", "script"),
        (".mtd", "material"),
        (".tae", "tae"),
        (".xml", "system"),
        (".ini", "system"),
        (".txt", "system"),
        (".pem", "system"),
        (".properties", "system"),
        (".param", "param"),
        (".paramdef", "param/def"),
        (".def", "param/def"),
        (".tdf", "param/tdf"),
        (".dbp", "dbmenu"),
        (".pam", "movie"),
        (".ffx", "sfx"),
    ];
    for (ext, folder) in TABLE {
        if *ext == extension {
            return (*folder).to_string();
        }
    }
    extension.trim_start_matches('.').to_lowercase()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn table_maps_known_extensions() {
        assert_eq!(guess_folder::<Cursor<Vec<u8>>>(".msb", None).unwrap(), "model/map");
        assert_eq!(guess_folder::<Cursor<Vec<u8>>>(".fmg", None).unwrap(), "lang/text");
    }

    #[test]
    fn unknown_extension_falls_back_to_bare_name() {
        assert_eq!(guess_folder::<Cursor<Vec<u8>>>(".foo", None).unwrap(), "foo");
    }

    #[test]
    fn dcx_suffix_appends_subfolder() {
        assert_eq!(guess_folder::<Cursor<Vec<u8>>>(".msb.dcx", None).unwrap(), "model/map/dcx");
    }

    #[test]
    fn bnd_without_peek_context_falls_back_to_bind() {
        assert_eq!(guess_folder::<Cursor<Vec<u8>>>(".bnd", None).unwrap(), "bind");
    }

    #[test]
    fn bnd_with_peek_buckets_by_inner_extension() {
        use crate::bnd::{BndArchive, BndKind};
        let mut archive = BndArchive::new(BndKind::Bnd4);
        archive.entries.push(crate::bnd::BndEntry {
            path: "a.msb".into(),
            data: vec![1, 2, 3],
        });
        archive.entries.push(crate::bnd::BndEntry {
            path: "b.msb".into(),
            data: vec![4, 5, 6],
        });
        archive.entries.push(crate::bnd::BndEntry {
            path: "c.tae".into(),
            data: vec![7],
        });
        let mut buf = Cursor::new(Vec::new());
        archive.write(&mut buf).unwrap();
        buf.set_position(0);

        let folder = guess_folder(".bnd", Some(&mut buf)).unwrap();
        assert_eq!(folder, "bind/model/map");
    }
}
