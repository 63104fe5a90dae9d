use async_trait::async_trait;
use parago::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// 模拟命令执行，不启动真实进程
struct SimulatedRunner;

#[async_trait]
impl CommandRunner for SimulatedRunner {
    async fn run(&self, _ctx: CancellationToken, task: &ReadyTask) -> Result<CommandOutput> {
        println!("执行任务: {} ({})", task.id, task.command);

        tokio::time::sleep(Duration::from_millis(100)).await;

        Ok(CommandOutput {
            code: Some(0),
            stdout: format!("{} done\n", task.id),
            stderr: String::new(),
        })
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let records = definition::parse_str(
        "
task1: make fetch
task2:
    cmd: make compile
    deps: [task1]
task3:
    cmd: make lint
    deps: [task1]
task4:
    cmd: make test
    deps: [task2, task3]
task5:
    cmd: make docs
    deps: [task2]
task6:
    cmd: make package
    deps: [task1, task4, task5]
",
    )?;

    let graph = TaskGraph::build(&records)?.validate()?;

    println!("=== 执行计划 ===");
    for (i, level) in graph.levels().iter().enumerate() {
        println!("{}. {}", i + 1, level.join(", "));
    }

    let scheduler = Arc::new(Scheduler::new(graph));
    let executor = Executor::new(scheduler, Arc::new(SimulatedRunner), ExecutorOptions::default());

    println!("=== 开始执行任务 ===");
    let start = std::time::Instant::now();
    let report = executor.execute(CancellationToken::new()).await?;

    println!("=== 执行完成 ===");
    println!("执行时间: {:?}", start.elapsed());
    println!("执行顺序: {}", report.execution_order.join(" -> "));

    Ok(())
}
