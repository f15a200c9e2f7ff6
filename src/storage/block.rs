// 块标识编码
//
// Block Blob 的提交清单按调用方给出的顺序拼装最终对象，
// 因此块 ID 必须由分块索引确定性生成，且按索引严格单调，
// 绝不能从完成顺序推导

use crate::storage::StorageError;
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// 块 ID 序号的零填充宽度
pub const BLOCK_ID_WIDTH: usize = 8;

/// 块 ID 前缀
pub const BLOCK_ID_PREFIX: &str = "block-";

/// 固定宽度编码可表示的最大块数（10^8）
///
/// 超出后序号溢出宽度，字典序不再与索引序一致，必须拒绝
pub const MAX_BLOCK_COUNT: u64 = 100_000_000;

/// 块标识
///
/// 序数形式 `block-00000042`，同宽零填充保证字节序 == 索引序；
/// 线上传输使用序数形式的 base64 编码
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId {
    index: u64,
}

impl BlockId {
    /// 由分块索引创建块 ID
    pub fn new(index: usize) -> Result<Self, StorageError> {
        let index = index as u64;
        if index >= MAX_BLOCK_COUNT {
            return Err(StorageError::BlockIndexOutOfRange {
                index,
                max: MAX_BLOCK_COUNT,
            });
        }
        Ok(Self { index })
    }

    /// 分块索引
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// 序数形式（零填充，字节序严格单调）
    pub fn ordinal(&self) -> String {
        format!(
            "{}{:0width$}",
            BLOCK_ID_PREFIX,
            self.index,
            width = BLOCK_ID_WIDTH
        )
    }

    /// 线上编码（base64）
    pub fn encoded(&self) -> String {
        STANDARD.encode(self.ordinal())
    }
}

/// 为 0..count 的每个分块生成块 ID
pub fn block_ids_for(count: usize) -> Result<Vec<BlockId>, StorageError> {
    (0..count).map(BlockId::new).collect()
}

/// 构造块清单提交报文
///
/// 块按索引升序列出，与分块实际完成顺序无关
pub fn block_list_manifest(block_ids: &[BlockId]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<BlockList>");
    for id in block_ids {
        xml.push_str("<Latest>");
        xml.push_str(&id.encoded());
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}
