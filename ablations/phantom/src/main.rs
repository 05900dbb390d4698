//! MALIS 损失在合成体模与磁盘样本上的消融实验.

mod phantom;
mod profile;
mod result;
mod runner;

fn main() {
    simple_logger::init_with_level(log::Level::Warn).expect("Logger initialization error");

    let result = runner::run();
    result.analyze();
}
