pub mod adapter;
pub mod domain;
pub mod infrastructure;
pub mod orchestrator;
pub mod usecase;

/// テスト用プロセッサとエンジン構築ヘルパー（統合テストから利用）
pub mod test_support;
