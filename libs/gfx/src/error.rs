// error.rs — 描画サブシステムのエラー型
//
// どのエラーも正しく動いていれば起きないもの。起きたときに原因を追えるよう、
// 発生箇所のファイル名と行番号を #[track_caller] で記録しておく。

use core::fmt;
use core::panic::Location;

/// エラーの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// バッファ確保に失敗した（起動時なら致命的）
    AllocationFailed,
    /// ピクセルフォーマットの違うバッファ同士でブロック転送しようとした
    FormatMismatch,
    /// 存在しないレイヤー ID を指定した
    UnknownLayer,
    /// ファームウェアが未対応のピクセル配置を報告した
    UnsupportedFormat,
    /// 借用したメモリ領域が stride * height に足りない
    BufferTooSmall,
}

impl ErrorCode {
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::AllocationFailed => "AllocationFailed",
            ErrorCode::FormatMismatch => "FormatMismatch",
            ErrorCode::UnknownLayer => "UnknownLayer",
            ErrorCode::UnsupportedFormat => "UnsupportedFormat",
            ErrorCode::BufferTooSmall => "BufferTooSmall",
        }
    }
}

/// エラーコード + 発生箇所
#[derive(Debug, Clone, Copy)]
pub struct Error {
    code: ErrorCode,
    location: &'static Location<'static>,
}

impl Error {
    /// 呼び出し元の位置を記録してエラーを作る。
    #[track_caller]
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            location: Location::caller(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn file(&self) -> &'static str {
        self.location.file()
    }

    pub fn line(&self) -> u32 {
        self.location.line()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.code.name(), self.file(), self.line())
    }
}

pub type Result<T> = core::result::Result<T, Error>;
