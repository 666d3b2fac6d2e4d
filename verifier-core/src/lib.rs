pub mod bytecode;
pub mod compilers;
pub mod sources;
pub mod standard_json;
pub mod verify;

pub use compilers::{CompileError, CompilersPool, DetailedVersion, DownloadCache, ListFetcher};
pub use verify::{
    Compilation, CompilationTarget, MatchType, VerificationError, VerificationExport,
    VerificationRequest,
};

pub const DEFAULT_SOLIDITY_COMPILER_LIST: &str =
    "https://binaries.soliditylang.org/linux-amd64/list.json";
pub const DEFAULT_SOLIDITY_JS_COMPILER_LIST: &str =
    "https://binaries.soliditylang.org/emscripten-wasm32/list.json";
pub const DEFAULT_VYPER_COMPILER_LIST: &str =
    "https://raw.githubusercontent.com/blockscout/solc-bin/main/vyper.list.json";
