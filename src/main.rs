fn main() -> std::process::ExitCode {
    goal_planner_lib::run()
}
