//! 七巧板原生文件格式（.tangram）
//!
//! 16 字节文件头之后是 Zstd 压缩的 MessagePack 数据：
//! - 魔数 `TGRM`
//! - 格式版本（u32，小端）
//! - 标志位（u32，预留）
//! - 压缩后数据长度（u32）
//!
//! 不带魔数的输入按 JSON 解析，可以是完整文档，也可以只是拼图本身。

use crate::document::Document;
use crate::error::FileError;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tangram_core::error::EngineError;
use tangram_core::puzzle::Puzzle;

/// 文件魔数 "TGRM"
const MAGIC: &[u8; 4] = b"TGRM";

/// 当前文件格式版本
const FORMAT_VERSION: u32 = 1;

/// Zstd 压缩级别
const COMPRESSION_LEVEL: i32 = 3;

const HEADER_SIZE: usize = 16;

/// 文件头（16 字节）
#[derive(Debug)]
struct FileHeader {
    magic: [u8; 4],
    version: u32,
    /// 标志位（预留）
    flags: u32,
    compressed_size: u32,
}

impl FileHeader {
    fn new(compressed_size: u32) -> Self {
        Self {
            magic: *MAGIC,
            version: FORMAT_VERSION,
            flags: 0,
            compressed_size,
        }
    }

    fn write(&self, writer: &mut impl Write) -> Result<(), std::io::Error> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        Ok(())
    }

    fn read(reader: &mut impl Read) -> Result<Self, FileError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;

        if &magic != MAGIC {
            return Err(FileError::InvalidFormat(
                "Invalid magic number, not a tangram file".to_string(),
            ));
        }

        let mut buf = [0u8; 4];

        reader.read_exact(&mut buf)?;
        let version = u32::from_le_bytes(buf);

        reader.read_exact(&mut buf)?;
        let flags = u32::from_le_bytes(buf);

        reader.read_exact(&mut buf)?;
        let compressed_size = u32::from_le_bytes(buf);

        Ok(Self {
            magic,
            version,
            flags,
            compressed_size,
        })
    }
}

/// JSON 输入：完整文档或裸拼图
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonInput {
    Document(Document),
    Puzzle(Puzzle),
}

/// 编码为二进制格式（文件头 + 压缩数据）
pub fn encode(document: &Document) -> Result<Vec<u8>, FileError> {
    // 按字段名编码，带标签的枚举和缺省字段都能正确还原
    let msgpack_data = rmp_serde::to_vec_named(document)?;
    let compressed_data = zstd::encode_all(msgpack_data.as_slice(), COMPRESSION_LEVEL)?;
    let compressed_size = u32::try_from(compressed_data.len())
        .map_err(|_| FileError::InvalidFormat("document too large".to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + compressed_data.len());
    FileHeader::new(compressed_size).write(&mut bytes)?;
    bytes.extend_from_slice(&compressed_data);
    Ok(bytes)
}

/// 编码为 JSON（带缩进）
pub fn encode_json(document: &Document) -> Result<String, FileError> {
    Ok(serde_json::to_string_pretty(document)?)
}

/// 解码文档：自动识别二进制或 JSON，并检查引用完整性
pub fn decode_document(bytes: &[u8]) -> Result<Document, FileError> {
    let document = if bytes.starts_with(MAGIC) {
        decode_binary(bytes)?
    } else {
        match serde_json::from_slice::<JsonInput>(bytes)? {
            JsonInput::Document(document) => document,
            JsonInput::Puzzle(puzzle) => Document::new(puzzle),
        }
    };

    document.puzzle.check_references().map_err(|e| match e {
        EngineError::DuplicatePiece(id) => FileError::DuplicatePiece(id),
        EngineError::PieceNotFound(id) => FileError::DanglingConnection(id),
        other => FileError::InvalidFormat(other.to_string()),
    })?;
    Ok(document)
}

/// 拼图数据的唯一反序列化入口
pub fn decode_puzzle(bytes: &[u8]) -> Result<Puzzle, FileError> {
    decode_document(bytes).map(|document| document.puzzle)
}

fn decode_binary(bytes: &[u8]) -> Result<Document, FileError> {
    let mut reader = bytes;
    let header = FileHeader::read(&mut reader)?;

    if header.version > FORMAT_VERSION {
        return Err(FileError::UnsupportedVersion(format!(
            "File version {} is newer than supported version {}",
            header.version, FORMAT_VERSION
        )));
    }

    let size = header.compressed_size as usize;
    if reader.len() < size {
        return Err(FileError::InvalidFormat(format!(
            "Truncated file: expected {} bytes of data, found {}",
            size,
            reader.len()
        )));
    }

    let msgpack_data = zstd::decode_all(&reader[..size])?;
    Ok(rmp_serde::from_slice(&msgpack_data)?)
}

/// 保存文档；扩展名为 `.json` 时写 JSON，否则写二进制格式
pub fn save(document: &Document, path: &Path) -> Result<(), FileError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let bytes = if is_json {
        encode_json(document)?.into_bytes()
    } else {
        encode(document)?
    };

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;

    tracing::info!(
        "Saved {} pieces, {} connections to {} ({} bytes)",
        document.puzzle.piece_count(),
        document.puzzle.connections().len(),
        path.display(),
        bytes.len()
    );

    Ok(())
}

/// 从文件加载文档
pub fn load(path: &Path) -> Result<Document, FileError> {
    let bytes = std::fs::read(path)?;
    let document = decode_document(&bytes)?;

    tracing::info!(
        "Loaded {} pieces, {} connections from {}",
        document.puzzle.piece_count(),
        document.puzzle.connections().len(),
        path.display()
    );

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangram_core::prelude::*;

    /// 正方形 + 顶点接在右下角的小三角形
    fn sample_puzzle() -> Puzzle {
        let config = EngineConfig::default();
        let mut puzzle = Puzzle::new();
        puzzle
            .add_piece(Piece::new(
                "sq".into(),
                PieceType::Square,
                Transform2D::from_translation(Vector2::new(375.0, 275.0)),
            ))
            .unwrap();
        let request = PlacementRequest::new(PieceType::SmallTriangle1)
            .with_id("tri")
            .pair(ConnectionPoint::vertex("sq", 2), Anchor::Vertex(0));
        let placement = calculate_placement(&puzzle, &request, &config).unwrap();
        puzzle.place_piece(placement).unwrap();
        puzzle
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.tangram");

        let document = Document::new(sample_puzzle()).with_title("Test Puzzle");
        save(&document, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header = FileHeader::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(&header.magic, MAGIC);
        assert_eq!(header.version, FORMAT_VERSION);
        assert_eq!(header.compressed_size as usize, bytes.len() - HEADER_SIZE);

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, document);
        assert_eq!(loaded.metadata.title, "Test Puzzle");
    }

    #[test]
    fn test_json_roundtrip_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");

        let document = Document::new(sample_puzzle());
        save(&document, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"vertexToVertex\""));
        assert_eq!(load(&path).unwrap(), document);
    }

    #[test]
    fn test_bare_puzzle_json_accepted() {
        let puzzle = sample_puzzle();
        let json = serde_json::to_vec(&puzzle).unwrap();
        assert_eq!(decode_puzzle(&json).unwrap(), puzzle);
    }

    #[test]
    fn test_dangling_connection_rejected() {
        let mut value = serde_json::to_value(sample_puzzle()).unwrap();
        value["pieces"].as_array_mut().unwrap().pop();
        let json = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            decode_puzzle(&json),
            Err(FileError::DanglingConnection(id)) if id == PieceId::new("tri")
        ));
    }

    #[test]
    fn test_duplicate_piece_rejected() {
        let mut value = serde_json::to_value(sample_puzzle()).unwrap();
        let pieces = value["pieces"].as_array_mut().unwrap();
        let first = pieces[0].clone();
        pieces.push(first);
        let json = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            decode_puzzle(&json),
            Err(FileError::DuplicatePiece(id)) if id == PieceId::new("sq")
        ));
    }

    #[test]
    fn test_invalid_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invalid.tangram");
        let mut bytes = b"XXXX".to_vec();
        bytes.extend_from_slice(&[0u8; 12]);
        std::fs::write(&path, &bytes).unwrap();

        // 没有魔数时按 JSON 解析，同样失败
        assert!(matches!(load(&path), Err(FileError::Json(_))));
    }

    #[test]
    fn test_newer_version_and_truncation() {
        let mut bytes = encode(&Document::new(sample_puzzle())).unwrap();

        let mut truncated = bytes.clone();
        truncated.truncate(HEADER_SIZE + 2);
        assert!(matches!(
            decode_puzzle(&truncated),
            Err(FileError::InvalidFormat(_))
        ));

        bytes[4..8].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        assert!(matches!(
            decode_puzzle(&bytes),
            Err(FileError::UnsupportedVersion(_))
        ));
    }
}
